use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};

use crate::error::Result;

/// Download a file as bytes, reporting progress with a [progress bar](indicatif).
pub fn download_file_as_bytes(url: &str, message: &str) -> Result<Vec<u8>> {
    tracing::info!("Downloading {message} from {url}");

    let mut response = reqwest::blocking::get(url)?.error_for_status()?;
    let total_size = response.content_length().unwrap_or(0);

    let progress = ProgressBar::new(total_size);
    progress.set_style(
        ProgressStyle::with_template(
            "{msg}\n    {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .with_key("eta", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
        })
        .progress_chars("▬  "),
    );
    progress.set_message(format!("Downloading {message}"));

    let mut bytes = Vec::with_capacity(total_size as usize);
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let read = response.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..read]);
        progress.inc(read as u64);
    }

    progress.finish_with_message(format!("Downloaded {message}"));

    Ok(bytes)
}

/// Fetch `{base_url}{name}.gz` and store its decompressed content at `dest_dir/name`.
///
/// The file is skipped when already present. Content is written to a `.part` file first and
/// renamed once complete, so an interrupted download never leaves a truncated cache entry.
pub fn download_gz_file(base_url: &str, name: &str, dest_dir: &Path) -> Result<PathBuf> {
    let file_name = dest_dir.join(name);

    if file_name.exists() {
        return Ok(file_name);
    }

    fs::create_dir_all(dest_dir)?;

    let bytes = download_file_as_bytes(&format!("{base_url}{name}.gz"), name)?;

    let partial = dest_dir.join(format!("{name}.part"));
    {
        let mut output = BufWriter::new(File::create(&partial)?);
        let mut gz_buffer = GzDecoder::new(&bytes[..]);
        std::io::copy(&mut gz_buffer, &mut output)?;
        output.flush()?;
    }
    fs::rename(&partial, &file_name)?;

    Ok(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_file_is_not_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("labels"), [1u8, 2, 3]).unwrap();

        // Nothing listens on the discard port, any request would fail.
        let path = download_gz_file("http://127.0.0.1:9/", "labels", dir.path()).unwrap();

        assert_eq!(fs::read(path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn unreachable_server_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        let result = download_gz_file("http://127.0.0.1:9/", "labels", dir.path());

        assert!(result.is_err());
        assert!(!dir.path().join("labels").exists());
        assert!(!dir.path().join("labels.part").exists());
    }
}
