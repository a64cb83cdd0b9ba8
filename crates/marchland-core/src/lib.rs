//! Movement lifecycle, resource economy and schedulers for Marchland.
//!
//! Everything goes through a [`World`]: player actions (dispatch, cancel,
//! upgrade), scheduler steps (resolve, return, resource tick) and reads
//! (villages, report inboxes). Persistent state sits behind the
//! [`WorldStore`] trait, time behind the [`Clock`] trait, and outgoing
//! notifications behind the [`NotificationDispatcher`] trait.
//!
//! # Modules
//!
//! - [`clock`] -- System and manual clocks.
//! - [`config`] -- Loading `marchland-config.yaml` into typed structs.
//! - [`control`] -- Pause, resume and stop for the schedulers.
//! - [`economy`] -- Village registration, accrual refresh, upgrades.
//! - [`error`] -- Validation, store, movement and world errors.
//! - [`lifecycle`] -- Dispatch, resolution, return and cancellation.
//! - [`locks`] -- Per-village async locks.
//! - [`notify`] -- Notification dispatchers.
//! - [`reports`] -- Report inbox and movement listings.
//! - [`scheduler`] -- The resolution and resource tick schedulers.
//! - [`store`] -- The store trait and its in-memory implementation.
//! - [`world`] -- The shared [`World`] handle.
//!
//! [`World`]: world::World
//! [`WorldStore`]: store::WorldStore
//! [`Clock`]: clock::Clock
//! [`NotificationDispatcher`]: notify::NotificationDispatcher

pub mod clock;
pub mod config;
pub mod control;
pub mod economy;
pub mod error;
pub mod lifecycle;
pub mod locks;
pub mod notify;
pub mod reports;
pub mod scheduler;
pub mod store;
pub mod world;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GameConfig;
pub use control::SchedulerControl;
pub use error::{MovementError, StoreError, ValidationError, WorldError};
pub use lifecycle::{DispatchReceipt, DispatchRequest};
pub use notify::{ChannelDispatcher, NotificationDispatcher, NotifyError, TracingDispatcher};
pub use scheduler::{ResolutionScheduler, ResolutionSummary, ResourceTickScheduler, TickSummary};
pub use store::{MemoryStore, ResolutionCommit, WorldStore};
pub use world::World;
