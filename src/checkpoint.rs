use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};

use crate::error::{Error, Result};
use crate::model::{Model, ModelConfig};

const MODEL_FILE: &str = "model";
// Extension appended by the recorder.
const MODEL_EXTENSION: &str = "mpk";
const CONFIG_FILE: &str = "config.json";

/// Full precision, so that a reloaded model predicts exactly like the saved one.
type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Model checkpoint stored in a directory:
///
/// ```txt
///  <dir>/
///    model.mpk     model record (named MessagePack)
///    config.json   architecture used to build the model
/// ```
pub struct Checkpoint {
    dir: PathBuf,
}

impl Checkpoint {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the model record, extension included.
    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE).with_extension(MODEL_EXTENSION)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Write the model parameters and its architecture, replacing any previous checkpoint.
    pub fn save<B: Backend>(&self, model: &Model<B>, config: &ModelConfig) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        config.save(self.config_path())?;
        model
            .clone()
            .save_file(self.dir.join(MODEL_FILE), &CheckpointRecorder::new())?;

        let path = self.model_path();
        tracing::info!("Saved checkpoint to '{}'", path.display());

        Ok(path)
    }

    /// Read the saved architecture.
    pub fn load_config(&self) -> Result<ModelConfig> {
        let path = self.config_path();
        if !path.exists() {
            return Err(Error::CheckpointNotFound(path));
        }

        ModelConfig::load(&path).map_err(|err| Error::Config(format!("{err:?}")))
    }

    /// Rebuild the saved architecture and load the parameters into it.
    pub fn load<B: Backend>(&self, device: &B::Device) -> Result<Model<B>> {
        let config = self.load_config()?;
        let model = config.init::<B>(device);

        self.load_into(model, &config, device)
    }

    /// Replace the parameters of a freshly built `model` (built from `config`) with the saved
    /// ones.
    pub fn load_into<B: Backend>(
        &self,
        model: Model<B>,
        config: &ModelConfig,
        device: &B::Device,
    ) -> Result<Model<B>> {
        let path = self.model_path();
        if !path.exists() {
            return Err(Error::CheckpointNotFound(path));
        }

        let expected = config.param_shapes();
        check_shapes(&expected, &self.load_config()?.param_shapes())?;

        let model = model.load_file(
            self.dir.join(MODEL_FILE),
            &CheckpointRecorder::new(),
            device,
        )?;
        check_shapes(&expected, &model.param_shapes())?;

        tracing::info!("Loaded checkpoint from '{}'", path.display());

        Ok(model)
    }
}

fn check_shapes(expected: &[(String, Vec<usize>)], found: &[(String, Vec<usize>)]) -> Result<()> {
    for (index, (name, shape)) in expected.iter().enumerate() {
        match found.get(index) {
            Some((found_name, found_shape)) if found_name == name && found_shape == shape => {}
            Some((_, found_shape)) => {
                return Err(Error::ShapeMismatch {
                    name: name.clone(),
                    expected: shape.clone(),
                    found: found_shape.clone(),
                })
            }
            None => {
                return Err(Error::ShapeMismatch {
                    name: name.clone(),
                    expected: shape.clone(),
                    found: Vec::new(),
                })
            }
        }
    }

    if let Some((name, shape)) = found.get(expected.len()) {
        return Err(Error::ShapeMismatch {
            name: name.clone(),
            expected: Vec::new(),
            found: shape.clone(),
        });
    }

    Ok(())
}
