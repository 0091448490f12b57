use std::io;
use std::path::{Component, Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

use convert_common::config::StorageConfig;

/// Reduce a client-supplied file name to a safe single path component.
///
/// Accented letters fold to their ASCII base (NFKD), other non-ASCII
/// characters are dropped, path separators become spaces, runs of
/// whitespace become `_`, anything outside `[A-Za-z0-9_.-]` is removed and
/// leading/trailing `.` and `_` are stripped.  The result may be empty.
pub fn sanitize_filename(name: &str) -> String {
    let ascii: String = name.nfkd().filter(char::is_ascii).collect();
    let spaced = ascii.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    cleaned.trim_matches(['.', '_']).to_string()
}

/// Make sure the upload and output roots exist.
pub async fn ensure_dirs(cfg: &StorageConfig) -> io::Result<()> {
    tokio::fs::create_dir_all(&cfg.upload_dir).await?;
    tokio::fs::create_dir_all(&cfg.output_dir).await?;
    Ok(())
}

/// Per-request locations: `<upload_dir>/<id>/<name>` for the input and
/// `<output_dir>/<id>/` for the result.  Concurrent requests with the same
/// file name never share a path.
#[derive(Debug, Clone)]
pub struct RequestStorage {
    pub request_id: String,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
}

impl RequestStorage {
    /// Create both request directories and write the uploaded bytes.
    /// `file_name` must already be sanitized.
    pub async fn create(
        cfg: &StorageConfig,
        request_id: &str,
        file_name: &str,
        data: &[u8],
    ) -> io::Result<Self> {
        if !is_single_component(file_name) || !is_single_component(request_id) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to store '{file_name}' under '{request_id}'"),
            ));
        }
        let upload_dir = cfg.upload_dir.join(request_id);
        let output_dir = cfg.output_dir.join(request_id);
        let input_path = upload_dir.join(file_name);

        let stored = async {
            tokio::fs::create_dir_all(&upload_dir).await?;
            tokio::fs::create_dir_all(&output_dir).await?;
            tokio::fs::write(&input_path, data).await
        }
        .await;
        if let Err(e) = stored {
            let _ = tokio::fs::remove_dir_all(&upload_dir).await;
            let _ = tokio::fs::remove_dir_all(&output_dir).await;
            return Err(e);
        }
        Ok(Self { request_id: request_id.to_string(), input_path, output_dir })
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// The input file name without its extension.
    pub fn input_stem(&self) -> String {
        self.input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn is_single_component(name: &str) -> bool {
    let mut comps = Path::new(name).components();
    matches!((comps.next(), comps.next()), (Some(Component::Normal(_)), None))
}
