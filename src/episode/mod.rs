mod download;
mod filename;

pub use download::{DownloadContext, DownloadOutcome, MAX_REDIRECTS, download_episode};
pub use filename::{
    PARTIAL_SUFFIX, destination_path, media_file_name, partial_path, strip_query,
};
