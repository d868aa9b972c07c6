pub mod insights;
pub mod post;
pub mod login;
pub mod init;
