//! Engine tunables, pulled out into a small struct so a host application
//! (or the `repay` CLI) can override them without touching the router or
//! executor.

/// `10^scale`, the factor used to convert `Amount`s to/from the router's
/// integer capacity space.
pub const DEFAULT_SCALE: u32 = ledger_amount::SCALE;

/// The factor edge costs are scaled and rounded by before entering the
/// router's integer cost space.
pub const DEFAULT_COST_SCALE_FACTOR: i64 = 1_000_000;

/// Default bound on `LimitCollision` retries before the executor gives up
/// and surfaces `Failed(LimitCollision)`.
pub const DEFAULT_MAX_LIMIT_COLLISION_RETRIES: u32 = 3;

/// Soft cap on the size (edge count) of the connected component the router
/// is asked to solve before `attempt_payment` logs a warning. This does not
/// reject the payment, it only flags graphs where the CPU-bound routing
/// step may run long.
pub const DEFAULT_MAX_ROUTE_COMPONENT_SIZE: usize = 50_000;

/// Tunable engine parameters. Constructed via `EngineConfig::default()` and
/// overridden selectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub cost_scale_factor: i64,
    pub scale: u32,
    pub max_limit_collision_retries: u32,
    pub max_route_component_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cost_scale_factor: DEFAULT_COST_SCALE_FACTOR,
            scale: DEFAULT_SCALE,
            max_limit_collision_retries: DEFAULT_MAX_LIMIT_COLLISION_RETRIES,
            max_route_component_size: DEFAULT_MAX_ROUTE_COMPONENT_SIZE,
        }
    }
}
