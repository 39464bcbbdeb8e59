use std::fmt;

/// Development key pair. Override both halves in any real deployment.
pub const DEV_PUBLIC_KEY: &str =
    "BEl62iUYgUivxIkv69yViEuiBIa40HI0DLLufTqDm84_FKjTQcdYQP_ZVFwUIgdPjDQQlFYE2HftRGJXw1cjGv0";
pub const DEV_PRIVATE_KEY: &str = "UDqzN1_xRJT8zM5xoHU9yfNk5KXVQY6vROZkNz8RhF0";

/// VAPID application server keys (base64url).
///
/// Only the public half is ever handed to clients. The type is deliberately
/// not `Serialize`, and `Debug` hides the private half.
#[derive(Clone)]
pub struct VapidKeys {
    public_key: String,
    private_key: String,
}

impl VapidKeys {
    pub fn new(public_key: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: private_key.into(),
        }
    }

    pub fn development() -> Self {
        Self::new(DEV_PUBLIC_KEY, DEV_PRIVATE_KEY)
    }

    pub fn is_development(&self) -> bool {
        self.private_key == DEV_PRIVATE_KEY
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// For transports that sign requests.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }
}

impl fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}
