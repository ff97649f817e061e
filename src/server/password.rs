use std::convert;
use std::fmt;

// Wraps the PASS argument so that neither Debug nor Display logging of a
// parsed command can leak the secret.
#[derive(PartialEq, Eq, Clone)]
pub struct Password {
    inner: String,
}

impl Password {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Password { inner: s.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*******")
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password(*******)")
    }
}

impl convert::From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SECRET: &str = "supersecret";

    #[test]
    fn password_obscures_display() {
        assert_eq!("*******", format!("{}", Password::new(SECRET)));
    }

    #[test]
    fn password_obscures_debug() {
        assert_eq!("Password(*******)", format!("{:?}", Password::new(SECRET)));
    }

    #[test]
    fn password_retrievable() {
        assert_eq!(SECRET, Password::new(SECRET).as_str())
    }
}
