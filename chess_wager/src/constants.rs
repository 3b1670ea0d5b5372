//! Protocol constants shared by the client and the escrow contract.

use std::ops::RangeInclusive;
use std::time::Duration;

/// Decimal places of the chain's native asset.
pub const NATIVE_DECIMALS: u32 = 18;

/// Rounds per match accepted by the matchmaking server.
pub const VALID_ROUNDS_RANGE: RangeInclusive<u32> = 1..=10;

/// Platform fee taken on top of the wager, in percent.
pub const DEFAULT_COMMISSION_PERCENTAGE: u32 = 5;

/// Largest wager the server accepts, in whole native units.
pub const DEFAULT_MAX_WAGER_NATIVE: u128 = 1_000;

/// Gas ceiling configured for `createGame`/`joinGame`.
pub const DEFAULT_GAS_LIMIT: u64 = 300_000;

/// How often the session refreshes its gas quote.
pub const DEFAULT_GAS_REFRESH: Duration = Duration::from_secs(15);

/// Cooldown between outbound currency lookups.
pub const RATE_LOOKUP_COOLDOWN: Duration = Duration::from_millis(500);

/// Countdown resolution used by the presenter.
pub const CLOCK_TICK: Duration = Duration::from_millis(100);

/// Buffered messages per session inbox.
pub const SESSION_INBOX_CAPACITY: usize = 64;

/// Buffered events per realtime channel subscriber.
pub const CHANNEL_EVENT_CAPACITY: usize = 256;
