//! User-visible strings.
//!
//! Every fixed line the server sends lives here, so the dialogue reads the
//! same from every screen and the tests have one place to point at.

pub const COMMAND_PROMPT: &str = "Command:";
pub const COMMAND_NOT_FOUND: &str = "Command not found!";
pub const HELP_FOOTER: &str = "Call help with command name for more info.";
pub const CANCELLING: &str = "Cancelling ...";

pub const BANNER: &str = "\
==============================
   Welcome to Multichat
     Rust Edition 1.0
==============================";

pub const TERMS_OF_SERVICE: &str = "\
TERMS OF SERVICE
By registering with this service, you agree
to be bound by these principle requirements:
1. This service is provided to you for free
   and must remain free for these terms to
   continue.
2. Administrators should be held faultless
   in all they do except promoting falsehood
   and deception.
3. The account given you remains the property
   of the issuer and may be removed without
   warning.
4. You give up all legal rights, privacy of
   data, and demands for fairness while using
   this system.
5. Your terms of service remain in effect if
   you lose possession over an account you
   received.";

pub const ABOUT: &str = "\
Multichat is a line-oriented chat server.
Connect with any client that can speak CRLF-terminated text.
The source is distributed separately from the running server.";

pub const TERMS_PROMPT: &str = "Do you agree?";
pub const USERNAME_PROMPT: &str = "Username:";
pub const PASSWORD_PROMPT: &str = "Password:";
pub const WHO_PROMPT: &str = "Who?";

pub const AUTH_FAILED: &str = "Authentication failed!";
pub const ALREADY_LOGGED_IN: &str = "Account is already logged in!";
pub const ACCOUNT_EXISTS: &str = "Account already exists!";
pub const NAME_HAS_WHITESPACE: &str = "Username may not have whitespace!";
pub const NAME_EMPTY: &str = "Username may not be empty.";
pub const PASSWORD_HAS_WHITESPACE: &str = "Password may not have whitespace!";

pub const WELCOME_ADMIN: &str = "Welcome, administrator!";
pub const NOT_AUTHORIZED: &str = "You are not authorized to be here.";
pub const WARNED_LAST_TIME: &str = "You have been warned for the last time!";
pub const ADDRESS_BLOCKED: &str = "Now your IP address has been blocked &";
pub const ACCOUNT_REMOVED_TOO: &str = "your account has been completely removed.";

pub const CHANNEL_PROMPT: &str = "Channel to open?";
pub const CHANNEL_HAS_WHITESPACE: &str = "Channel name may not have whitespace!";
pub const CHANNEL_EMPTY: &str = "Channel name may not be empty.";
pub const CHANNEL_BANNED: &str = "You have been banned from this channel.";
pub const CHANNEL_AUTH_FAILED: &str = "You have failed authentication.";
pub const CHANNEL_KICKED: &str = "You have been kicked out of this channel.";
pub const CHANNEL_CLOSED: &str = "This channel has been permanently closed.";
pub const CHANNEL_PASSWORD_PROMPT: &str = "Password to connect:";
pub const NOT_PRIVILEGED: &str = "Only administrators or channel owner may do that.";
pub const TRY_ADD_DEL_LIST: &str = "Try add, del, or list.";
pub const SIZE_PROMPT: &str = "Size limitation:";
pub const SIZE_INVALID: &str = "Please enter a non-negative number.";
pub const RESERVED_COMMAND: &str = "Reserved command for future expansion ...";

pub const OPENING_ADMIN_CONSOLE: &str = "Opening admin console ...";
pub const OPENING_ACCOUNT_EDITOR: &str = "Opening account editor ...";
pub const OPENING_CONTACT_MANAGER: &str = "Opening contact manager ...";
pub const OPENING_MESSAGE_MANAGER: &str = "Opening message manager ...";
pub const OPENING_ACCOUNT_OPTIONS: &str = "Opening account options ...";

pub const DISCONNECTING: &str = "Disconnecting ...";
pub const REPORT_ERROR: &str = "Please report this error ASAP!";

pub const RULE: &str =
    "======================================================================";
pub const ERROR_RULE: &str =
    "XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX";

/// `[source] body`, the rendering of one channel line.
pub fn channel_line(source: &str, body: &str) -> String {
    format!("[{}] {}", source, body)
}

pub fn setting_up(owner: &str) -> String {
    format!("{} is setting up this channel.", owner)
}

pub fn joining(name: &str) -> String {
    format!("{} is joining.", name)
}

pub fn leaving(name: &str) -> String {
    format!("{} is leaving.", name)
}

pub fn message_event(source: &str) -> String {
    format!("[EVENT] {} has sent you a message.", source)
}

pub fn shutting_down(admin: &str) -> String {
    format!("{} is shutting down your connection.", admin)
}
