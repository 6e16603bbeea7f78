// -
// Key layout

/// Default root under which service instances are registered
pub(crate) const DEFAULT_PREFIX_PATH: &str = "/registry";

/// Separator between the prefix path, the service name and the instance id
pub(crate) const KEY_SEPARATOR: char = '/';

// -
// Configuration

/// Environment variable naming an extra configuration file
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Prefix of environment variable overrides, e.g. `DISCOVERY__REGISTRY__PREFIX_PATH`
pub(crate) const ENV_PREFIX: &str = "DISCOVERY";

pub(crate) const ENV_SEPARATOR: &str = "__";

// -
// Watch

/// Pending change notifications per watcher. One slot gives latest-wins coalescing.
pub(crate) const WATCH_NOTIFY_CAPACITY: usize = 1;
