//! C5: robot state view. Pure function over an external observation plus
//! a busy bit derived from the store (spec §4.2, §9 "busy as a derived
//! query"). `RobotStateCache`/`PoiResolver` are the external collaborator
//! traits from spec §6 — implemented by an out-of-core poller/mapper in
//! production, by fakes in tests.

use crate::store::models::{Position, RobotObservation};
use async_trait::async_trait;

/// What `RobotStateCache::get` reports for one robot id.
pub enum RobotLookup {
    /// A cached observation exists (possibly stale — staleness is
    /// reported as `fresh_as_of`, not as a variant here).
    Known(RobotObservation),
    /// No observation is cached yet (e.g. monitor outage). Treated
    /// permissively: `online` defaults to unknown.
    StaleOrMissing,
    /// Not a registered robot identity at all. A hard no.
    Unregistered,
}

#[async_trait]
pub trait RobotStateCache: Send + Sync {
    async fn get(&self, robot_id: &str) -> RobotLookup;
}

#[async_trait]
pub trait PoiResolver: Send + Sync {
    async fn resolve(&self, target_kind: &str, target_ref: &str) -> Option<Position>;
}

/// Thin read-only adapters over the cache tables an external poller and
/// POI mapper populate (spec §6's "Robot POI cache" persisted layout).
/// Neither the poller nor the mapper is implemented here — these structs
/// only read what they wrote.
pub mod pg {
    use super::*;
    use sqlx::PgPool;

    pub struct PgRobotStateCache {
        pool: PgPool,
        registry: Vec<String>,
    }

    impl PgRobotStateCache {
        pub fn new(pool: PgPool, registry: Vec<String>) -> Self {
            Self { pool, registry }
        }
    }

    #[async_trait]
    impl RobotStateCache for PgRobotStateCache {
        async fn get(&self, robot_id: &str) -> RobotLookup {
            if !self.registry.iter().any(|id| id == robot_id) {
                return RobotLookup::Unregistered;
            }
            let row: Option<(Option<bool>, Option<bool>, Option<bool>, Option<String>, Option<f64>, Option<f64>, Option<f64>)> = sqlx::query_as(
                r#"
                SELECT online, charging, emergency_stop, area_id, x, y, yaw
                FROM robot_state_cache WHERE robot_id = $1
                "#,
            )
            .bind(robot_id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or(None);

            match row {
                None => RobotLookup::StaleOrMissing,
                Some((online, charging, emergency_stop, area_id, x, y, yaw)) => {
                    let position = match (area_id, x, y, yaw) {
                        (Some(area_id), Some(x), Some(y), Some(yaw)) => Some(Position { area_id, x, y, yaw }),
                        _ => None,
                    };
                    RobotLookup::Known(RobotObservation {
                        online,
                        charging,
                        emergency_stop,
                        position,
                        fresh_as_of: None,
                    })
                }
            }
        }
    }

    pub struct PgPoiResolver {
        pool: PgPool,
    }

    impl PgPoiResolver {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl PoiResolver for PgPoiResolver {
        async fn resolve(&self, target_kind: &str, target_ref: &str) -> Option<Position> {
            let row: Option<(String, f64, f64, f64)> = sqlx::query_as(
                "SELECT area_id, x, y, yaw FROM poi_cache WHERE target_kind = $1 AND target_ref = $2",
            )
            .bind(target_kind)
            .bind(target_ref)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or(None);
            row.map(|(area_id, x, y, yaw)| Position { area_id, x, y, yaw })
        }
    }
}

#[derive(Debug, Clone)]
pub struct RobotView {
    pub robot_id: String,
    pub busy: bool,
    pub eligible: bool,
    pub reason: Option<String>,
}

/// `eligible = online ∧ ¬charging ∧ ¬emergency_stop`, unknowns permissive
/// except `online=false` which is decisive. `busy` is an independent input
/// (the caller supplies it via `Store::is_robot_busy`) since eligibility
/// and busy-ness are orthogonal predicates in the assignment algorithm.
pub fn eligibility(lookup: &RobotLookup) -> (bool, Option<String>) {
    match lookup {
        RobotLookup::Unregistered => (false, Some("robot not registered".to_string())),
        RobotLookup::StaleOrMissing => (true, None),
        RobotLookup::Known(obs) => {
            if obs.online == Some(false) {
                return (false, Some("robot offline".to_string()));
            }
            if obs.charging == Some(true) {
                return (false, Some("robot charging".to_string()));
            }
            if obs.emergency_stop == Some(true) {
                return (false, Some("emergency stop active".to_string()));
            }
            (true, None)
        }
    }
}

pub fn view(robot_id: &str, lookup: RobotLookup, busy: bool) -> RobotView {
    let (eligible, reason) = eligibility(&lookup);
    RobotView {
        robot_id: robot_id.to_string(),
        busy,
        eligible,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_robot_is_a_hard_no() {
        let (eligible, reason) = eligibility(&RobotLookup::Unregistered);
        assert!(!eligible);
        assert_eq!(reason.as_deref(), Some("robot not registered"));
    }

    #[test]
    fn missing_observation_is_permissive() {
        let (eligible, reason) = eligibility(&RobotLookup::StaleOrMissing);
        assert!(eligible);
        assert!(reason.is_none());
    }

    #[test]
    fn offline_is_decisive_even_if_other_fields_unknown() {
        let obs = RobotObservation {
            online: Some(false),
            ..Default::default()
        };
        let (eligible, reason) = eligibility(&RobotLookup::Known(obs));
        assert!(!eligible);
        assert_eq!(reason.as_deref(), Some("robot offline"));
    }

    #[test]
    fn charging_blocks_eligibility() {
        let obs = RobotObservation {
            online: Some(true),
            charging: Some(true),
            ..Default::default()
        };
        let (eligible, reason) = eligibility(&RobotLookup::Known(obs));
        assert!(!eligible);
        assert_eq!(reason.as_deref(), Some("robot charging"));
    }

    #[test]
    fn fully_known_good_state_is_eligible() {
        let obs = RobotObservation {
            online: Some(true),
            charging: Some(false),
            emergency_stop: Some(false),
            ..Default::default()
        };
        let (eligible, reason) = eligibility(&RobotLookup::Known(obs));
        assert!(eligible);
        assert!(reason.is_none());
    }
}
