// Credential & session store: local accounts with argon2 hashes, opaque
// server-side sessions carried in an HttpOnly cookie.

pub mod extract;
pub mod handlers;
pub mod password;
pub mod sessions;
pub mod users;
