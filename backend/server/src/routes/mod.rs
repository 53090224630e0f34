//! # Routes
//!
//! All board endpoints sit under `/api/no-login`, reports under `/api`.
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET | `/posts` | [`list_posts_handler`] |
//! | POST | `/posts` | [`create_post_handler`] |
//! | POST | `/posts/{id}/reactions` | [`react_handler`] |
//! | GET | `/posts/{id}/replies` | [`list_replies_handler`] |
//! | GET | `/posts/{id}/replies/tree` | [`reply_tree_handler`] |
//! | POST | `/posts/{id}/replies` | [`create_reply_handler`] |
//! | GET | `/posts/{id}/polls` | [`get_poll_handler`] |
//! | POST | `/posts/{id}/polls` | [`vote_handler`] |
//! | GET | `/channels` | [`list_channels_handler`] |
//! | POST | `/channels` | [`create_channel_handler`] |
//! | GET | `/channels/joined` | [`joined_channels_handler`] |
//! | POST | `/channels/{id}/join` | [`join_channel_handler`] |
//! | POST | `/channels/{id}/leave` | [`leave_channel_handler`] |
//! | GET | `/channels/{id}/posts` | [`list_channel_posts_handler`] |
//! | POST | `/channels/{id}/posts` | [`create_channel_post_handler`] |
//! | POST | `/api/reports` | [`create_report_handler`] |
pub mod channels;
pub mod polls;
pub mod posts;
pub mod replies;
pub mod reports;

pub use channels::{
    create_channel_handler, create_channel_post_handler, join_channel_handler,
    joined_channels_handler, leave_channel_handler, list_channel_posts_handler,
    list_channels_handler,
};
pub use polls::{get_poll_handler, vote_handler};
pub use posts::{create_post_handler, list_posts_handler, react_handler};
pub use replies::{create_reply_handler, list_replies_handler, reply_tree_handler};
pub use reports::create_report_handler;
