use std::fmt;

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::{FashionMnistBatch, FashionMnistBatcher};
use crate::dataset::{class_name, FashionMnistItem};
use crate::model::Model;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    pub predicted: usize,
    pub actual: usize,
}

impl Prediction {
    pub fn is_correct(&self) -> bool {
        self.predicted == self.actual
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "predicted: '{}', Actual: '{}'",
            class_name(self.predicted).unwrap_or("unknown"),
            class_name(self.actual).unwrap_or("unknown"),
        )
    }
}

/// Classify a single item.
pub fn predict<B: Backend>(
    model: &Model<B>,
    item: FashionMnistItem,
    device: &B::Device,
) -> Prediction {
    let actual = item.label as usize;
    let batch: FashionMnistBatch<B> = FashionMnistBatcher::new().batch(vec![item], device);

    let output = model.forward(batch.images);
    let predicted = output
        .argmax(1)
        .flatten::<1>(0, 1)
        .into_scalar()
        .elem::<i64>() as usize;

    Prediction { predicted, actual }
}
