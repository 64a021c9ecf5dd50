use std::{
    fs,
    io::{Read, Write},
    path::Path,
    time::Duration,
};

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

/// Makes sure `model_path` exists, downloading it from `model_url` if needed.
pub fn ensure_model_file(
    label: &str,
    model_path: &Path,
    model_url: Option<&str>,
) -> anyhow::Result<()> {
    if model_path.exists() {
        log::debug!("{label} model present at {}", model_path.display());
        return Ok(());
    }

    let Some(url) = model_url else {
        bail!(
            "{label} model not found at {} and no model_url is configured",
            model_path.display()
        );
    };

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    download_to_path(label, url, model_path)
        .with_context(|| format!("failed to download {label} model to {}", model_path.display()))
}

fn download_to_path(label: &str, url: &str, dest: &Path) -> anyhow::Result<()> {
    log::info!("downloading {label} model from {url} to {}", dest.display());

    let mut response = Client::new()
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let progress = create_progress_bar(response.content_length());
    save_stream(&mut response, dest, &progress)?;
    progress.finish_with_message(format!("{label} model ready"));
    Ok(())
}

/// Streams `reader` into `<dest>.download` and renames it into place. The
/// partial file is removed when any step fails.
fn save_stream<R: Read>(
    reader: &mut R,
    dest: &Path,
    progress: &ProgressBar,
) -> anyhow::Result<()> {
    let tmp_path = dest.with_extension("download");
    let result = write_partial(reader, &tmp_path, progress).and_then(|()| {
        fs::rename(&tmp_path, dest).with_context(|| {
            format!(
                "failed to move temp model {} into place at {}",
                tmp_path.display(),
                dest.display()
            )
        })
    });

    if result.is_err() {
        progress.abandon();
        if let Err(err) = fs::remove_file(&tmp_path) {
            log::debug!("could not remove partial download {}: {err}", tmp_path.display());
        }
    }
    result
}

fn write_partial<R: Read>(
    reader: &mut R,
    tmp_path: &Path,
    progress: &ProgressBar,
) -> anyhow::Result<()> {
    let mut file = fs::File::create(tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if bytes_read == 0 {
            break;
        }
        file.write_all(&buffer[..bytes_read])
            .context("failed while writing model to disk")?;
        downloaded += bytes_read as u64;
        progress.set_position(downloaded);
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            let template = "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] \
                            {bytes}/{total_bytes} ({eta})";
            if let Ok(style) = ProgressStyle::with_template(template) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading model") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}
