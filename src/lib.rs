//! Backend for the Amarasté experience: a persona chat assistant streamed at
//! reading pace, a durable local cache for the PDF documents the screens
//! show, and the session/navigation state that ties them together.

pub mod assets;
pub mod control;
pub mod db;
pub mod llm;
pub mod persona;
pub mod presenter;
pub mod session;
