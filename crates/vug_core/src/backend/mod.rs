//! Backend environment: canonical on-disk layout of the portable runtime,
//! plus the download and archive-extraction primitives provisioning is
//! built from.

mod download;
mod env;
mod extract;

pub use download::{download_file, DownloadError, MAX_DOWNLOAD_RETRIES};
pub use env::BackendEnv;
pub use extract::{extract_7z, extract_archive, extract_tar_gz, extract_zip, ExtractError};
