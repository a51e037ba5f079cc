pub mod apply;
pub mod fetch;
pub mod status;

use crate::cli::SourceArgs;
use crate::config::{self, Config};

/// Let flags and their environment variables override the config file
pub(crate) fn apply_source(config: &mut Config, args: &SourceArgs) {
    if let Some(dir) = &args.work_dir {
        config.work_dir = config::expand(dir);
    }
    if let Some(url) = &args.master_url {
        config.master_url = Some(url.clone());
    }
    if let Some(url) = &args.user_url {
        config.user_url = Some(url.clone());
    }
}
