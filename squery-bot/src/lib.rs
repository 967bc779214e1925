//! squery-bot: chat-command moderation bot on top of `squery-sdk`.
//!
//! Chat commands (default prefix `!`):
//!
//!   mp [text]     poke every connected user
//!   mm            move every connected user to the invoker's channel
//!   mk [reason]   kick every connected user from the server
//!   test          list connected users in the bot log
//!
//! The first three are restricted to a configured server group each.

pub mod actions;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod router;
