//! Chat session core: ties the session store, REST client and chat channel
//! together behind [`ChatClient`], and exposes one [`ConversationView`] per
//! open conversation.

pub mod client;
pub mod contacts;
pub mod view;

pub use client::ChatClient;
pub use contacts::ContactList;
pub use view::ConversationView;
