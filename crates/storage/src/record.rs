use common::Rid;

/// One row image: an opaque byte run keyed by its rid.
///
/// Field access goes through the owning table's field metas (offset/len);
/// the record itself knows nothing about the layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    rid: Rid,
    data: Vec<u8>,
}

impl Record {
    pub fn new(rid: Rid, data: Vec<u8>) -> Self {
        Self { rid, data }
    }

    pub fn rid(&self) -> Rid {
        self.rid
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Byte run of one field.
    pub fn field_slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }
}
