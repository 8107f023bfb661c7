use crate::core::{Identifier, Identity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// NodeSnapshot is a copy of a node's routing state and stored keys taken at one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub identity: Identity,
    pub predecessor: Option<Identity>,
    pub successors: Vec<Identity>,
    pub fingers: Vec<(usize, Identity)>,
    pub entries: Vec<(Identifier, String, String)>,
}

impl Display for NodeSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Identifier: {}", self.identity.id())?;
        writeln!(f, "Address: {}", self.identity.address())?;
        match &self.predecessor {
            Some(predecessor) => writeln!(f, "Predecessor: {}", predecessor)?,
            None => writeln!(f, "Predecessor: none")?,
        }
        match self.successors.first() {
            Some(successor) => writeln!(f, "Successor: {}", successor)?,
            None => writeln!(f, "Successor: none")?,
        }
        writeln!(f, "Successor List:")?;
        for (i, successor) in self.successors.iter().enumerate() {
            writeln!(f, "  {}: {}", i, successor)?;
        }
        writeln!(f, "Finger Table:")?;
        for (i, finger) in &self.fingers {
            writeln!(f, "  {}: {}", i, finger)?;
        }
        write!(f, "Hash Table:")?;
        for (id, key, value) in &self.entries {
            write!(f, "\n  {} {:?} => {:?}", id, key, value)?;
        }
        Ok(())
    }
}
