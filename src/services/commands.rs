use crate::models::types::HabboId;

/// Chat command collaborator. Messages starting with `:` are routed here
/// with the colon already stripped; a `true` return means the input was
/// consumed and no chat event follows.
pub trait ChatCommandHandler: Send + Sync {
    fn handle(&self, user: HabboId, input: &str) -> bool;
}

/// Default handler: consumes nothing.
pub struct NullCommandHandler;

impl ChatCommandHandler for NullCommandHandler {
    fn handle(&self, _user: HabboId, _input: &str) -> bool {
        false
    }
}
