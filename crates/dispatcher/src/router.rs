//! Platform routing
//!
//! Resolves the target set of a request against the configured platform
//! queues. Targets come back in platform order, which is also lexical order.

use contracts::{DispatchError, DispatchOptions, Platform};

/// One dispatch target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub platform: Platform,
    pub routing_key: String,
}

/// Decide the targets for a raw platform name
///
/// An empty name fans out to every configured platform.
///
/// # Errors
/// `UnknownRoute` when the name is not a known platform, the platform has no
/// configured queue, or the target set is empty.
pub fn route(platform: &str, options: &DispatchOptions) -> Result<Vec<Route>, DispatchError> {
    if platform.is_empty() {
        let routes: Vec<Route> = options
            .platform_queues()
            .iter()
            .map(|(platform, key)| Route {
                platform: *platform,
                routing_key: key.clone(),
            })
            .collect();
        if routes.is_empty() {
            return Err(DispatchError::unknown_route("no fan-out targets configured"));
        }
        return Ok(routes);
    }

    let parsed: Platform = platform
        .parse()
        .map_err(|e| DispatchError::unknown_route(format!("{e}")))?;

    let routing_key = options.routing_key(parsed).ok_or_else(|| {
        DispatchError::unknown_route(format!("platform '{parsed}' has no configured queue"))
    })?;

    Ok(vec![Route {
        platform: parsed,
        routing_key: routing_key.to_string(),
    }])
}
