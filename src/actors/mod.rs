//! Actor-based alarm evaluation
//!
//! The engine runs as a set of independent async tasks communicating via
//! Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │    ValueFeed     │ broadcast<PointUpdate>
//!                  └────────┬─────────┘
//!                           │ subscribe (all shards)
//!          ┌────────────────┼────────────────┐
//!          │                │                │
//!  ┌───────▼───────┐ ┌──────▼────────┐ ┌─────▼─────────┐
//!  │ Evaluator-0   │ │ Evaluator-1   │ │ Evaluator-N   │
//!  │ (item shard)  │ │ (item shard)  │ │ (item shard)  │
//!  └───────┬───────┘ └──────┬────────┘ └─────┬─────────┘
//!          │  commit Activate/Clear (transactional)
//!          ▼
//!  ┌───────────────┐   then   ┌────────────────────┐
//!  │  AlarmStore   │ ───────► │ NotificationPublisher
//!  └───────────────┘          │ CascadeDispatcher  │ (async, detached)
//!                             └────────────────────┘
//! ```
//!
//! ## Serialization model
//!
//! Every point is owned by exactly one evaluator shard (routing by item-id
//! hash), so all alarms watching it are evaluated by a single writer and
//! Activate/Clear pairs can never interleave. Distinct items evaluate in
//! parallel across shards.
//!
//! ## Communication Patterns
//!
//! 1. **Events**: value updates arrive on a broadcast channel; every shard
//!    subscribes and keeps only its own items
//! 2. **Commands**: each shard has an mpsc command channel for definition
//!    changes and control messages
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod evaluator;
pub mod messages;
