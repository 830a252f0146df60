pub mod channel;
pub mod conversation;
pub mod dispatcher;

pub use channel::{ChannelManager, ChannelState};
pub use conversation::{Admission, Conversation};
pub use dispatcher::{Dispatcher, Subscription};
