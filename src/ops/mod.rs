// ============================================================================
// OPS: pixel operations
// ============================================================================
//
//   shapes.rs    anti-aliased coverage for discs, ellipses, capsules, polygons
//   fill.rs      scanline flood fill
//   templates.rs built-in line-art templates
// ============================================================================

pub mod fill;
pub mod shapes;
pub mod templates;
