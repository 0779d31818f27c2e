#![allow(dead_code)]

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use burn::backend::{Autodiff, NdArray};
use fashion_quickstart::dataset::{
    FashionMnistDataset, FashionMnistItem, HEIGHT, NUM_CLASSES, WIDTH,
};

pub type TestBackend = NdArray;
pub type TestAutodiffBackend = Autodiff<TestBackend>;

// The NdArray seed is global, tests relying on it must not interleave.
static SEED_LOCK: Mutex<()> = Mutex::new(());

pub fn seed_lock() -> MutexGuard<'static, ()> {
    SEED_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Item of class `label`: two bright rows at a position unique to the class.
pub fn striped_item(label: u8) -> FashionMnistItem {
    let mut image = [[0f32; WIDTH]; HEIGHT];
    let row = 2 + 2 * label as usize;
    image[row] = [255.0; WIDTH];
    image[row + 1] = [255.0; WIDTH];

    FashionMnistItem { image, label }
}

/// `len` items cycling through all classes.
pub fn striped_items(len: usize) -> Vec<FashionMnistItem> {
    (0..len)
        .map(|i| striped_item((i % NUM_CLASSES) as u8))
        .collect()
}

pub fn striped_dataset(len: usize) -> FashionMnistDataset {
    FashionMnistDataset::from_items(striped_items(len))
}

fn idx_images(items: &[FashionMnistItem]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&2051u32.to_be_bytes());
    bytes.extend_from_slice(&(items.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&(HEIGHT as u32).to_be_bytes());
    bytes.extend_from_slice(&(WIDTH as u32).to_be_bytes());
    for item in items {
        for row in item.image.iter() {
            bytes.extend(row.iter().map(|pixel| *pixel as u8));
        }
    }
    bytes
}

fn idx_labels(items: &[FashionMnistItem]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&2049u32.to_be_bytes());
    bytes.extend_from_slice(&(items.len() as u32).to_be_bytes());
    bytes.extend(items.iter().map(|item| item.label));
    bytes
}

/// Populate the dataset cache under `root` so no download happens.
pub fn write_cached_split(root: &Path, train: &[FashionMnistItem], test: &[FashionMnistItem]) {
    let raw_dir = FashionMnistDataset::raw_dir(root);
    std::fs::create_dir_all(&raw_dir).unwrap();

    std::fs::write(raw_dir.join("train-images-idx3-ubyte"), idx_images(train)).unwrap();
    std::fs::write(raw_dir.join("train-labels-idx1-ubyte"), idx_labels(train)).unwrap();
    std::fs::write(raw_dir.join("t10k-images-idx3-ubyte"), idx_images(test)).unwrap();
    std::fs::write(raw_dir.join("t10k-labels-idx1-ubyte"), idx_labels(test)).unwrap();
}
