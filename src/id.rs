use slotmap::new_key_type;

new_key_type! {
    /// Identifies a node or link in the infrastructure registry.
    pub struct EntityId;

    /// Identifies a power source inside a power domain.
    pub struct SourceId;

    /// Identifies a placed application.
    pub struct ApplicationId;
}
