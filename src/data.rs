use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::dataset::{FashionMnistItem, HEIGHT, WIDTH};

#[derive(Clone, Default)]
pub struct FashionMnistBatcher {}

#[derive(Clone, Debug)]
pub struct FashionMnistBatch<B: Backend> {
    /// Images scaled to `[0, 1]`, shape `[N, 1, 28, 28]`.
    pub images: Tensor<B, 4>,
    /// Class labels, shape `[N]`.
    pub targets: Tensor<B, 1, Int>,
}

impl FashionMnistBatcher {
    pub fn new() -> Self {
        Self {}
    }
}

impl<B: Backend> Batcher<B, FashionMnistItem, FashionMnistBatch<B>> for FashionMnistBatcher {
    fn batch(&self, items: Vec<FashionMnistItem>, device: &B::Device) -> FashionMnistBatch<B> {
        let images = items
            .iter()
            .map(|item| TensorData::from(item.image).convert::<B::FloatElem>())
            .map(|data| Tensor::<B, 2>::from_data(data, device))
            .map(|tensor| tensor.reshape([1, 1, HEIGHT, WIDTH]))
            .map(|tensor| tensor / 255)
            .collect();

        let targets = items
            .iter()
            .map(|item| {
                Tensor::<B, 1, Int>::from_data(
                    TensorData::from([(item.label as i64).elem::<B::IntElem>()]),
                    device,
                )
            })
            .collect();

        let images = Tensor::cat(images, 0);
        let targets = Tensor::cat(targets, 0);

        FashionMnistBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn item(value: f32, label: u8) -> FashionMnistItem {
        FashionMnistItem {
            image: [[value; WIDTH]; HEIGHT],
            label,
        }
    }

    #[test]
    fn batch_has_channel_dimension_and_scaled_pixels() {
        let device = Default::default();
        let batch: FashionMnistBatch<TestBackend> = FashionMnistBatcher::new().batch(
            vec![item(255.0, 3), item(0.0, 7), item(51.0, 0)],
            &device,
        );

        assert_eq!(batch.images.dims(), [3, 1, HEIGHT, WIDTH]);
        assert_eq!(batch.targets.dims(), [3]);

        let pixels = batch.images.to_data().to_vec::<f32>().unwrap();
        assert_eq!(pixels[0], 1.0);
        assert_eq!(pixels[WIDTH * HEIGHT], 0.0);
        assert!((pixels[2 * WIDTH * HEIGHT] - 0.2).abs() < 1e-6);

        let targets = batch.targets.to_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![3, 7, 0]);
    }
}
