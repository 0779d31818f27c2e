use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::{transform::PartialDataset, Dataset},
    },
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::checkpoint::Checkpoint;
use crate::data::{FashionMnistBatch, FashionMnistBatcher};
use crate::dataset::{FashionMnistDataset, FashionMnistItem};
use crate::error::Error;
use crate::inference::{predict, Prediction};
use crate::model::{Model, ModelConfig};

pub type FashionMnistLoader<B> = Arc<dyn DataLoader<B, FashionMnistBatch<B>>>;

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    pub optimizer: SgdConfig,
    #[config(default = 1)]
    pub num_epochs: usize,
    #[config(default = 64)]
    pub batch_size: usize,
    #[config(default = 1)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1.0e-3)]
    pub learning_rate: f64,
    /// Print the training loss every `log_interval` batches.
    #[config(default = 100)]
    pub log_interval: usize,
    #[config(default = false)]
    pub shuffle: bool,
    /// Only use the first items of the train split.
    pub max_train_items: Option<usize>,
    /// Only use the first items of the test split.
    pub max_test_items: Option<usize>,
}

/// Environment variable naming a JSON file that overrides the default [`TrainingConfig`].
pub const CONFIG_ENV: &str = "QUICKSTART_CONFIG";

impl TrainingConfig {
    /// Read and check a configuration saved as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let config = Self::load(path)
            .map_err(|err| Error::Config(format!("{}: {err:?}", path.display())))?;
        config.check()?;

        Ok(config)
    }

    /// Defaults, or the file named by [`CONFIG_ENV`] when it is set.
    pub fn from_env() -> crate::Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                tracing::info!("Loading training config from '{}'", Path::new(&path).display());
                Self::from_file(path)
            }
            None => Ok(Self::new(ModelConfig::new(), SgdConfig::new())),
        }
    }

    /// Reject values the loaders cannot work with.
    pub fn check(&self) -> crate::Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }

        Ok(())
    }
}

/// Statistics of one training epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TrainSummary {
    pub num_batches: usize,
    pub num_items: usize,
    /// Loss of the last batch.
    pub last_loss: f64,
    /// Mean of the batch losses.
    pub mean_loss: f64,
}

/// Statistics of one evaluation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct EvalSummary {
    pub num_batches: usize,
    pub num_items: usize,
    /// Mean of the batch losses, `0.0` when there was no batch.
    pub avg_loss: f64,
    /// Fraction of correctly classified items, `0.0` when there was no item.
    pub accuracy: f64,
}

impl fmt::Display for EvalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Test Error: \n Accuracy: {:.1}%, Avg loss: {:>8.6} \n",
            100.0 * self.accuracy,
            self.avg_loss
        )
    }
}

/// Everything `run` produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub train: Vec<TrainSummary>,
    pub eval: Vec<EvalSummary>,
    /// Prediction of the reloaded model on the first test item, if any.
    pub prediction: Option<Prediction>,
}

/// Build a loader over `dataset` following the batching options of `config`.
///
/// Batches come in dataset order unless shuffling is enabled; more than one worker may
/// reorder them.
pub fn dataloader<B, D>(
    dataset: D,
    config: &TrainingConfig,
    device: &B::Device,
) -> FashionMnistLoader<B>
where
    B: Backend,
    D: Dataset<FashionMnistItem> + 'static,
{
    let mut builder = DataLoaderBuilder::new(FashionMnistBatcher::new())
        .batch_size(config.batch_size)
        .set_device(device.clone());

    if config.shuffle {
        builder = builder.shuffle(config.seed);
    }
    if config.num_workers > 1 {
        builder = builder.num_workers(config.num_workers);
    }

    builder.build(dataset)
}

/// One optimization pass over `loader`.
pub fn train_epoch<B, O>(
    mut model: Model<B>,
    optim: &mut O,
    loader: &FashionMnistLoader<B>,
    learning_rate: f64,
    log_interval: usize,
) -> (Model<B>, TrainSummary)
where
    B: AutodiffBackend,
    O: Optimizer<Model<B>, B>,
{
    let size = loader.num_items();
    let mut summary = TrainSummary::default();
    let mut loss_sum = 0.0;

    for (iteration, batch) in loader.iter().enumerate() {
        let batch_size = batch.targets.dims()[0];
        let output = model.forward_batch(batch);
        let loss = output.loss.clone().into_scalar().elem::<f64>();

        // Gradients for the current backward pass
        let grads = output.loss.backward();
        // Gradients linked to each parameter of the model.
        let grads = GradientsParams::from_grads(grads, &model);
        model = optim.step(learning_rate, model, grads);

        summary.num_batches += 1;
        summary.num_items += batch_size;
        summary.last_loss = loss;
        loss_sum += loss;

        if log_interval > 0 && iteration % log_interval == 0 {
            println!("loss: {loss:>7.6} [{:>5}/{size:>5}]", summary.num_items);
        }
    }

    if summary.num_batches > 0 {
        summary.mean_loss = loss_sum / summary.num_batches as f64;
    }

    (model, summary)
}

/// Loss and accuracy of `model` over `loader`, without tracking gradients.
pub fn evaluate<B: Backend>(model: &Model<B>, loader: &FashionMnistLoader<B>) -> EvalSummary {
    let mut summary = EvalSummary::default();
    let mut loss_sum = 0.0;
    let mut num_corrects = 0;

    for batch in loader.iter() {
        let output = model.forward_batch(batch);

        summary.num_batches += 1;
        summary.num_items += output.targets.dims()[0];
        loss_sum += output.loss.into_scalar().elem::<f64>();

        let predictions = output.output.argmax(1).flatten::<1>(0, 1);
        num_corrects += predictions
            .equal(output.targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>() as usize;
    }

    if summary.num_batches == 0 {
        tracing::warn!("Evaluation loader yielded no batch");
        return summary;
    }

    summary.avg_loss = loss_sum / summary.num_batches as f64;
    summary.accuracy = num_corrects as f64 / summary.num_items as f64;

    summary
}

fn truncated<D: Dataset<FashionMnistItem>>(
    dataset: D,
    max_items: Option<usize>,
) -> PartialDataset<D, FashionMnistItem> {
    let end = max_items.map_or(dataset.len(), |max| max.min(dataset.len()));
    PartialDataset::new(dataset, 0, end)
}

/// Download the data, train and evaluate for `config.num_epochs`, save the checkpoint into
/// `artifact_dir`, reload it and classify the first test item.
pub fn run<B: AutodiffBackend>(
    data_dir: impl AsRef<Path>,
    artifact_dir: impl AsRef<Path>,
    config: TrainingConfig,
    device: B::Device,
) -> crate::Result<RunReport> {
    config.check()?;

    let artifact_dir = artifact_dir.as_ref();
    std::fs::create_dir_all(artifact_dir)?;
    config.save(artifact_dir.join("training_config.json"))?;

    B::seed(config.seed);

    let dataset_train = truncated(
        FashionMnistDataset::train(data_dir.as_ref())?,
        config.max_train_items,
    );
    let dataset_test = truncated(
        FashionMnistDataset::test(data_dir.as_ref())?,
        config.max_test_items,
    );
    let sample = dataset_test.get(0);

    let dataloader_train = dataloader::<B, _>(dataset_train, &config, &device);
    let dataloader_test = dataloader::<B::InnerBackend, _>(dataset_test, &config, &device);

    if let Some(batch) = dataloader_test.iter().next() {
        println!("Shape of X [N, C, H, W]: {:?}", batch.images.dims());
        println!("Shape of y: {:?} Int", batch.targets.dims());
    }

    println!("Using {device:?} device");

    let mut model = config.model.init::<B>(&device);
    let mut optim = config.optimizer.init::<B, Model<B>>();

    let mut report = RunReport {
        train: Vec::with_capacity(config.num_epochs),
        eval: Vec::with_capacity(config.num_epochs),
        prediction: None,
    };

    let now = Instant::now();
    for epoch in 1..=config.num_epochs {
        println!("Epoch {epoch}\n-------------------------------");

        let (trained, train) = train_epoch(
            model,
            &mut optim,
            &dataloader_train,
            config.learning_rate,
            config.log_interval,
        );
        model = trained;
        tracing::info!(
            "Epoch {epoch}: {} batches, mean loss {:.6}",
            train.num_batches,
            train.mean_loss
        );

        let eval = evaluate(&model.valid(), &dataloader_test);
        println!("{eval}");

        report.train.push(train);
        report.eval.push(eval);
    }
    let elapsed = now.elapsed().as_secs();
    tracing::info!("Training completed in {}m{}s", elapsed / 60, elapsed % 60);
    println!("Done!");

    let checkpoint = Checkpoint::new(artifact_dir);
    let path = checkpoint.save(&model, &config.model)?;
    println!("Saved model state to {}", path.display());

    let loaded = checkpoint.load::<B::InnerBackend>(&device)?;
    println!("{loaded}");

    if let Some(item) = sample {
        let prediction = predict(&loaded, item, &device);
        println!("{prediction}");
        tracing::info!("First test item classified correctly: {}", prediction.is_correct());
        report.prediction = Some(prediction);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_quickstart() {
        let config = TrainingConfig::new(ModelConfig::new(), SgdConfig::new());

        assert_eq!(config.num_epochs, 1);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.learning_rate, 1.0e-3);
        assert!(!config.shuffle);
        assert_eq!(config.max_train_items, None);
    }

    #[test]
    fn eval_summary_display() {
        let summary = EvalSummary {
            num_batches: 2,
            num_items: 100,
            avg_loss: 0.5,
            accuracy: 0.875,
        };

        assert_eq!(
            summary.to_string(),
            "Test Error: \n Accuracy: 87.5%, Avg loss: 0.500000 \n"
        );
    }

    #[test]
    fn config_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let model = ModelConfig::new().with_hidden_size(64);
        let config = TrainingConfig::new(model, SgdConfig::new())
            .with_max_train_items(Some(512))
            .with_seed(7);

        config.save(&path).unwrap();
        let loaded = TrainingConfig::load(&path).unwrap();

        assert_eq!(loaded.model.hidden_size, 64);
        assert_eq!(loaded.max_train_items, Some(512));
        assert_eq!(loaded.seed, 7);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training_config.json");
        TrainingConfig::new(ModelConfig::new(), SgdConfig::new())
            .with_batch_size(0)
            .save(&path)
            .unwrap();

        let result = TrainingConfig::from_file(&path);

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();

        let result = TrainingConfig::from_file(dir.path().join("absent.json"));

        assert!(matches!(result, Err(Error::Config(_))));
    }

    // Only test touching the variable, so it cannot race with another one.
    #[test]
    fn env_variable_selects_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training_config.json");
        TrainingConfig::new(ModelConfig::new(), SgdConfig::new())
            .with_num_epochs(3)
            .save(&path)
            .unwrap();

        std::env::set_var(CONFIG_ENV, &path);
        let loaded = TrainingConfig::from_env();
        std::env::set_var(CONFIG_ENV, dir.path().join("absent.json"));
        let missing = TrainingConfig::from_env();
        std::env::remove_var(CONFIG_ENV);
        let defaults = TrainingConfig::from_env().unwrap();

        assert_eq!(loaded.unwrap().num_epochs, 3);
        assert!(matches!(missing, Err(Error::Config(_))));
        assert_eq!(defaults.num_epochs, 1);
    }
}
