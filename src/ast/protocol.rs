use crate::lexer::Position;
use crate::types::Type;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProtocolMethod {
    pub name: char,
    pub params: Vec<Type>,
    pub return_type: Type,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Protocol {
    pub name: char,
    pub namespace: char,
    pub methods: Vec<ProtocolMethod>,
    /// Monotonic program-wide index assigned when the protocol is
    /// declared, used for O(1) dispatch (§9).
    pub index: usize,
    pub position: Position,
    pub doc_comment: Option<String>,
}

impl Protocol {
    pub fn method_offset(&self, name: char) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }
}
