pub mod account;
pub mod claims;
pub mod forgot_password;
pub mod login;
pub mod logout;
pub mod reset_password;
pub mod session;
pub mod signup;
pub mod verify;

pub use account::handle_delete_account;
pub use forgot_password::handle_forgot_password;
pub use login::handle_login;
pub use login::handle_me;
pub use logout::handle_logout;
pub use reset_password::handle_reset_password;
pub use signup::handle_signup;
pub use verify::{resend_verification, verify_email};
