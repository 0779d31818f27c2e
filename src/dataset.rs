use std::fs;
use std::path::{Path, PathBuf};

use burn::data::dataset::{
    transform::{Mapper, MapperDataset},
    Dataset, InMemDataset,
};
use serde::{Deserialize, Serialize};

use crate::download::download_gz_file;
use crate::error::{Error, Result};

// Same mirror torchvision uses.
const URL: &str = "http://fashion-mnist.s3-website.eu-central-1.amazonaws.com/";
const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_CLASSES: usize = 10;

/// Human readable names of the FashionMNIST labels, indexed by label.
pub const CLASSES: [&str; NUM_CLASSES] = [
    "T-shirt/top",
    "Trouser",
    "Pullover",
    "Dress",
    "Coat",
    "Sandal",
    "Shirt",
    "Sneaker",
    "Bag",
    "Ankle boot",
];

/// Name of the class for the given label, if the label is valid.
pub fn class_name(label: usize) -> Option<&'static str> {
    CLASSES.get(label).copied()
}

/// FashionMNIST item.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FashionMnistItem {
    /// Image as a 2D array of raw pixel intensities (0 to 255).
    pub image: [[f32; WIDTH]; HEIGHT],

    /// Label of the image.
    pub label: u8,
}

#[derive(Deserialize, Debug, Clone)]
struct FashionMnistItemRaw {
    pub image_bytes: Vec<u8>,
    pub label: u8,
}

struct BytesToImage;

impl Mapper<FashionMnistItemRaw, FashionMnistItem> for BytesToImage {
    fn map(&self, item: &FashionMnistItemRaw) -> FashionMnistItem {
        debug_assert_eq!(item.image_bytes.len(), WIDTH * HEIGHT);

        let mut image = [[0f32; WIDTH]; HEIGHT];
        for (i, pixel) in item.image_bytes.iter().enumerate() {
            image[i / WIDTH][i % WIDTH] = *pixel as f32;
        }

        FashionMnistItem {
            image,
            label: item.label,
        }
    }
}

type MappedDataset =
    MapperDataset<InMemDataset<FashionMnistItemRaw>, BytesToImage, FashionMnistItemRaw>;

enum Source {
    Idx(MappedDataset),
    Items(InMemDataset<FashionMnistItem>),
}

/// The FashionMNIST dataset: 70,000 28x28 grayscale images of clothing in 10 classes,
/// split into 60,000 training images and 10,000 test images.
///
/// Files are downloaded once into `<root>/FashionMNIST/raw` and kept in memory afterwards.
pub struct FashionMnistDataset {
    source: Source,
}

impl Dataset<FashionMnistItem> for FashionMnistDataset {
    fn get(&self, index: usize) -> Option<FashionMnistItem> {
        match &self.source {
            Source::Idx(dataset) => dataset.get(index),
            Source::Items(dataset) => dataset.get(index),
        }
    }

    fn len(&self) -> usize {
        match &self.source {
            Source::Idx(dataset) => dataset.len(),
            Source::Items(dataset) => dataset.len(),
        }
    }
}

impl FashionMnistDataset {
    /// Train split, downloaded under `root` when missing.
    pub fn train<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::load(root.as_ref(), TRAIN_IMAGES, TRAIN_LABELS)
    }

    /// Test split, downloaded under `root` when missing.
    pub fn test<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::load(root.as_ref(), TEST_IMAGES, TEST_LABELS)
    }

    /// Build a dataset from the content of an IDX image file and an IDX label file.
    pub fn from_idx(images: &[u8], labels: &[u8]) -> Result<Self> {
        let images = parse_images(images, "images")?;
        let labels = parse_labels(labels, "labels")?;

        if images.len() != labels.len() {
            return Err(Error::invalid_idx(
                "labels",
                format!("{} labels for {} images", labels.len(), images.len()),
            ));
        }

        let items: Vec<_> = images
            .into_iter()
            .zip(labels)
            .map(|(image_bytes, label)| FashionMnistItemRaw { image_bytes, label })
            .collect();

        let dataset = MapperDataset::new(InMemDataset::new(items), BytesToImage);

        Ok(Self {
            source: Source::Idx(dataset),
        })
    }

    /// Build a dataset from already decoded items.
    pub fn from_items(items: Vec<FashionMnistItem>) -> Self {
        Self {
            source: Source::Items(InMemDataset::new(items)),
        }
    }

    /// Directory holding the raw IDX files.
    pub fn raw_dir<P: AsRef<Path>>(root: P) -> PathBuf {
        root.as_ref().join("FashionMNIST").join("raw")
    }

    fn load(root: &Path, images: &str, labels: &str) -> Result<Self> {
        let raw_dir = Self::raw_dir(root);

        let images = download_gz_file(URL, images, &raw_dir)?;
        let labels = download_gz_file(URL, labels, &raw_dir)?;

        let dataset = Self::from_idx(&fs::read(&images)?, &fs::read(&labels)?)?;
        tracing::info!(
            "Loaded {} items from '{}'",
            dataset.len(),
            images.display()
        );

        Ok(dataset)
    }
}

fn read_u32(bytes: &[u8], offset: usize, name: &str) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::invalid_idx(name, "truncated header"))
}

/// Split an IDX image file (16-byte header) into one byte vector per image.
fn parse_images(bytes: &[u8], name: &str) -> Result<Vec<Vec<u8>>> {
    let magic = read_u32(bytes, 0, name)?;
    if magic != IMAGES_MAGIC {
        return Err(Error::invalid_idx(
            name,
            format!("expected magic number {IMAGES_MAGIC}, found {magic}"),
        ));
    }

    let size = read_u32(bytes, 4, name)? as usize;
    let rows = read_u32(bytes, 8, name)? as usize;
    let cols = read_u32(bytes, 12, name)? as usize;
    if (rows, cols) != (HEIGHT, WIDTH) {
        return Err(Error::invalid_idx(
            name,
            format!("expected {HEIGHT}x{WIDTH} images, found {rows}x{cols}"),
        ));
    }

    let payload = &bytes[16..];
    if payload.len() != size * WIDTH * HEIGHT {
        return Err(Error::invalid_idx(
            name,
            format!(
                "header declares {size} images but payload holds {} bytes",
                payload.len()
            ),
        ));
    }

    Ok(payload
        .chunks(WIDTH * HEIGHT)
        .map(|chunk| chunk.to_vec())
        .collect())
}

/// Read the labels of an IDX label file (8-byte header).
fn parse_labels(bytes: &[u8], name: &str) -> Result<Vec<u8>> {
    let magic = read_u32(bytes, 0, name)?;
    if magic != LABELS_MAGIC {
        return Err(Error::invalid_idx(
            name,
            format!("expected magic number {LABELS_MAGIC}, found {magic}"),
        ));
    }

    let size = read_u32(bytes, 4, name)? as usize;
    let labels = &bytes[8..];
    if labels.len() != size {
        return Err(Error::invalid_idx(
            name,
            format!("header declares {size} labels, found {}", labels.len()),
        ));
    }

    if let Some(label) = labels.iter().find(|label| **label as usize >= NUM_CLASSES) {
        return Err(Error::invalid_idx(name, format!("label {label} out of range")));
    }

    Ok(labels.to_vec())
}
