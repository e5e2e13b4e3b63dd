/// Vocabulary resources the interpreter core reads
///
/// - vocab.996: class table, one (reserved, script) word pair per class id
/// - vocab.997: selector names, used for diagnostics and the disassembler
use crate::error::{VmError, VmResult};

pub const CLASS_VOCAB: u16 = 996;
pub const SELECTOR_VOCAB: u16 = 997;

fn word(data: &[u8], offset: usize) -> VmResult<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| VmError::LoaderMismatch(format!("vocab truncated at {offset}")))
}

/// Script number of each class id
pub fn parse_class_vocab(data: &[u8]) -> VmResult<Vec<u16>> {
    if data.len() % 4 != 0 {
        return Err(VmError::LoaderMismatch(format!(
            "class vocab length {} is not a multiple of 4",
            data.len()
        )));
    }
    (0..data.len() / 4).map(|i| word(data, i * 4 + 2)).collect()
}

#[derive(Debug, Default, Clone)]
pub struct SelectorNames {
    names: Vec<String>,
}

impl SelectorNames {
    pub fn parse(data: &[u8]) -> VmResult<Self> {
        let count = word(data, 0)? as usize;
        let mut names = Vec::with_capacity(count);
        for i in 0..count {
            let offset = word(data, 2 + i * 2)? as usize;
            let len = word(data, offset)? as usize;
            let bytes = data.get(offset + 2..offset + 2 + len).ok_or_else(|| {
                VmError::LoaderMismatch(format!("selector name {i} runs past the vocab"))
            })?;
            names.push(bytes.iter().map(|&b| b as char).collect());
        }
        Ok(SelectorNames { names })
    }

    pub fn from_names(names: &[&str]) -> Self {
        SelectorNames {
            names: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn name(&self, selector: u16) -> Option<&str> {
        self.names.get(selector as usize).map(|s| s.as_str())
    }

    pub fn selector(&self, name: &str) -> Option<u16> {
        self.names.iter().position(|n| n == name).map(|i| i as u16)
    }

    /// Name if known, otherwise the number
    pub fn describe(&self, selector: u16) -> String {
        match self.name(selector) {
            Some(name) => name.to_string(),
            None => format!("sel_{selector}"),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
