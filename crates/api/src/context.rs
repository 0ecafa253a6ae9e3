use collo_core::OperatorId;

/// Operator identity of a request, used only for audit stamping.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OperatorContext {
    operator_id: OperatorId,
}

impl OperatorContext {
    pub fn new(operator_id: OperatorId) -> Self {
        Self { operator_id }
    }

    pub fn operator_id(&self) -> OperatorId {
        self.operator_id
    }
}
