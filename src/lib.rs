pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod fleet;
pub mod http;
pub mod plan;
pub mod progress;
pub mod state;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::{PodcastConfig, Settings};
pub use episode::{DownloadContext, DownloadOutcome, download_episode, media_file_name};
pub use error::{ConfigError, DownloadError, FeedError, StateError};
pub use feed::{Episode, fetch_feed, parse_feed};
pub use fleet::{FleetOutcome, PodcastListing, list_fleet, run_fleet};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use plan::{DownloadPlan, create_download_plan, episode_identifier, should_download};
pub use progress::{
    LogReporter, NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter,
};
pub use state::{DownloadRecord, StateStore};
pub use sync::{
    DownloadedEpisode, FailedEpisode, FetchOptions, RunResult, list_episodes, process_podcast,
};
