pub mod mailbox;

pub use mailbox::Mailbox;
