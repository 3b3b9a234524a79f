// ============================================================================
// COMPONENTS: stateful pieces the session wires together
// ============================================================================
//
//   history.rs  snapshot undo/redo for the paint layer
//   patterns.rs pattern tiles and their single-slot cache
//   tools.rs    tools, brush settings, and the stroke engine
// ============================================================================

pub mod history;
pub mod patterns;
pub mod tools;
