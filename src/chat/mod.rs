//! Chat-platform integration: token resolution, the IRC session, and the reward filter
//! that turns channel messages into zoom commands.

pub mod auth;
mod filter;
mod irc;
mod session;


pub use auth::{AuthError, AuthToken, ChatAuthManager, TokenSource};
pub use filter::{first_integer, CommandFilter, Verdict, REWARD_TAG};
pub use irc::{unescape_tag, ChatMessage, IrcLine};
pub use session::{ChatSession, ChatTarget, SessionError, SessionState, CONNECT_TIMEOUT};
