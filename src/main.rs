#![recursion_limit = "256"]

use std::path::Path;

use fashion_quickstart::{
    logging::install_logger,
    training::{self, TrainingConfig},
};

const DATA_DIR: &str = "fashion_data";
const ARTIFACT_DIR: &str = "artifacts";

#[cfg(feature = "tch-gpu")]
mod backend {
    use burn::backend::{libtorch::LibTorchDevice, Autodiff, LibTorch};

    pub type Backend = Autodiff<LibTorch>;

    pub fn device() -> LibTorchDevice {
        #[cfg(not(target_os = "macos"))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(target_os = "macos")]
        let device = LibTorchDevice::Mps;

        device
    }
}

#[cfg(all(feature = "wgpu", not(feature = "tch-gpu")))]
mod backend {
    use burn::backend::{wgpu::WgpuDevice, Autodiff, Wgpu};

    pub type Backend = Autodiff<Wgpu>;

    /// The best adapter available on this machine.
    pub fn device() -> WgpuDevice {
        WgpuDevice::default()
    }
}

#[cfg(all(feature = "tch-cpu", not(any(feature = "tch-gpu", feature = "wgpu"))))]
mod backend {
    use burn::backend::{libtorch::LibTorchDevice, Autodiff, LibTorch};

    pub type Backend = Autodiff<LibTorch>;

    pub fn device() -> LibTorchDevice {
        LibTorchDevice::Cpu
    }
}

#[cfg(all(
    feature = "ndarray",
    not(any(feature = "tch-gpu", feature = "wgpu", feature = "tch-cpu"))
))]
mod backend {
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};

    pub type Backend = Autodiff<NdArray>;

    pub fn device() -> NdArrayDevice {
        NdArrayDevice::Cpu
    }
}

#[cfg(not(any(
    feature = "ndarray",
    feature = "wgpu",
    feature = "tch-cpu",
    feature = "tch-gpu"
)))]
compile_error!("At least one backend feature must be enabled.");

fn main() -> fashion_quickstart::Result<()> {
    std::fs::create_dir_all(ARTIFACT_DIR)?;
    install_logger(Some(&Path::new(ARTIFACT_DIR).join("experiment.log")));

    let config = TrainingConfig::from_env()?;
    training::run::<backend::Backend>(DATA_DIR, ARTIFACT_DIR, config, backend::device())?;

    Ok(())
}
