use burn::{
    nn::{loss::CrossEntropyLossConfig, Linear, LinearConfig, Relu},
    prelude::*,
};

use crate::data::FashionMnistBatch;

#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    linear1: Linear<B>,
    linear2: Linear<B>,
    linear3: Linear<B>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = 784)]
    pub input_size: usize,
    #[config(default = 512)]
    pub hidden_size: usize,
    #[config(default = 10)]
    pub num_classes: usize,
}

/// Output of a classification forward pass.
#[derive(Debug)]
pub struct ClassificationOutput<B: Backend> {
    /// Mean cross-entropy over the batch, shape `[1]`.
    pub loss: Tensor<B, 1>,
    /// Logits, shape `[N, num_classes]`.
    pub output: Tensor<B, 2>,
    /// Class labels, shape `[N]`.
    pub targets: Tensor<B, 1, Int>,
}

impl ModelConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        Model {
            linear1: LinearConfig::new(self.input_size, self.hidden_size).init(device),
            linear2: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            linear3: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }

    /// Name and shape of every parameter of the model this config builds.
    pub fn param_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let layers = [
            ("linear1", self.input_size, self.hidden_size),
            ("linear2", self.hidden_size, self.hidden_size),
            ("linear3", self.hidden_size, self.num_classes),
        ];

        layers
            .into_iter()
            .flat_map(|(name, d_input, d_output)| {
                [
                    (format!("{name}.weight"), vec![d_input, d_output]),
                    (format!("{name}.bias"), vec![d_output]),
                ]
            })
            .collect()
    }
}

impl<B: Backend> Model<B> {
    /// # Shapes
    ///   - Images [batch_size, channels, height, width]
    ///   - Output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = images.flatten::<2>(1, 3);

        let x = self.linear1.forward(x);
        let x = self.activation.forward(x);
        let x = self.linear2.forward(x);
        let x = self.activation.forward(x);

        self.linear3.forward(x)
    }

    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput {
            loss,
            output,
            targets,
        }
    }

    pub fn forward_batch(&self, batch: FashionMnistBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }

    /// Name and shape of every parameter currently held by the model.
    pub fn param_shapes(&self) -> Vec<(String, Vec<usize>)> {
        [
            ("linear1", &self.linear1),
            ("linear2", &self.linear2),
            ("linear3", &self.linear3),
        ]
        .into_iter()
        .flat_map(|(name, linear)| {
            let mut shapes = vec![(format!("{name}.weight"), linear.weight.dims().to_vec())];
            if let Some(bias) = &linear.bias {
                shapes.push((format!("{name}.bias"), bias.dims().to_vec()));
            }
            shapes
        })
        .collect()
    }
}
