#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PackageVersion {
    pub major: u16,
    pub minor: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Package {
    pub name: String,
    pub version: PackageVersion,
    pub requires_native_binary: bool,
}

impl Package {
    /// The sentinel "standard package" section (§6) has a zero-length
    /// name and signals "use the host's built-in providers".
    pub fn is_standard(&self) -> bool {
        self.name.is_empty()
    }
}
