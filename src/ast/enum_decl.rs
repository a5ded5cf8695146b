use std::collections::HashMap;

use crate::lexer::Position;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EnumDecl {
    pub name: char,
    pub namespace: char,
    pub members: HashMap<char, i64>,
    pub position: Position,
    pub doc_comment: Option<String>,
}

impl EnumDecl {
    pub fn new(name: char, namespace: char, position: Position) -> Self {
        Self {
            name,
            namespace,
            members: HashMap::new(),
            position,
            doc_comment: None,
        }
    }

    /// Assigns the next sequential value unless `explicit` overrides it,
    /// per §4.C.
    pub fn add_member(&mut self, name: char, explicit: Option<i64>) {
        let value = explicit.unwrap_or_else(|| self.members.len() as i64);
        self.members.insert(name, value);
    }
}
