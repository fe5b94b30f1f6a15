pub use ecow::EcoString as VaultStr;

pub static VSTR_EMPTY: VaultStr = VaultStr::new();

pub trait StrExt {
    /// Storage identifiers follow the usual identifier rules: a leading
    /// letter or underscore, then letters, digits or underscores.
    fn is_identifier(&self) -> bool;
}

impl StrExt for str {
    fn is_identifier(&self) -> bool {
        let mut chars = self.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

impl StrExt for VaultStr {
    fn is_identifier(&self) -> bool {
        self.as_str().is_identifier()
    }
}
