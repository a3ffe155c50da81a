pub use scan3d_core as core;
pub use scan3d_fusion as fusion;
pub use scan3d_io as io;
pub use scan3d_point_cloud as point_cloud;
pub use scan3d_registration as registration;

/// Initialize a single global Rayon thread pool for all CPU-parallel routines.
///
/// Call this once at application startup before processing frames.
/// Repeated calls are idempotent and return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `SCAN3D_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<(), String> {
    scan3d_core::init_global_thread_pool(num_threads)
}
