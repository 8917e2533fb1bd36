use crate::types::{GatewayRecord, GatewayState};
use chrono::{DateTime, Utc};

/// Derive a gateway's liveness from its last-seen timestamp and
/// advertised heartbeat interval.
///
/// A gateway is online while `now - last_seen_at` is within twice its
/// stats interval (boundary inclusive). Pure read-side projection;
/// callers supply a fresh `GatewayRecord` snapshot.
pub fn derive_gateway_state(gateway: &GatewayRecord, now: DateTime<Utc>) -> GatewayState {
    let last_seen = match gateway.last_seen_at {
        Some(ts) if ts.timestamp() > 0 => ts,
        _ => return GatewayState::NeverSeen,
    };

    let elapsed = now.signed_duration_since(last_seen).num_seconds();
    if elapsed <= 2 * i64::from(gateway.stats_interval_secs) {
        GatewayState::Online
    } else {
        GatewayState::Offline
    }
}
