/// Assumed when the platform offers no cheap query (Windows and anything
/// other than Linux or macOS) or the query fails.
const FALLBACK_MEMORY_GB: f64 = 8.0;

/// Available memory in GB: `MemAvailable` on Linux, total physical memory
/// on macOS, [`FALLBACK_MEMORY_GB`] elsewhere.
pub fn get_available_memory_gb() -> f64 {
    #[cfg(target_os = "linux")]
    {
        if let Some(gb) = std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|text| parse_meminfo_available_gb(&text))
        {
            return gb;
        }
    }

    #[cfg(target_os = "macos")]
    {
        let bytes = std::process::Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()
            .and_then(|out| String::from_utf8(out.stdout).ok())
            .and_then(|text| text.trim().parse::<f64>().ok());
        if let Some(bytes) = bytes {
            return bytes / 1024.0 / 1024.0 / 1024.0;
        }
    }

    log::debug!("Memory query unavailable, assuming {} GB", FALLBACK_MEMORY_GB);
    FALLBACK_MEMORY_GB
}

/// `MemAvailable` from `/proc/meminfo` text, converted from kB to GB.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo_available_gb(meminfo: &str) -> Option<f64> {
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemAvailable:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<f64>().ok())
        .map(|kb| kb / 1024.0 / 1024.0)
}

/// Estimate the working set of one frame task in MB.
///
/// A task holds the decoded source, the warped copy and the grayscale
/// output at once.
pub fn estimate_frame_footprint_mb(width: u32, height: u32, bytes_per_pixel: u32) -> f64 {
    let raw = width as f64 * height as f64 * bytes_per_pixel as f64;
    raw * 2.5 / (1024.0 * 1024.0)
}

/// Worker count for the apply stage.
///
/// Uses every core unless half the available memory cannot hold that many
/// frames at once. Never returns less than one.
pub fn optimal_worker_count(available_gb: f64, frame_footprint_mb: f64) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let usable_mb = available_gb * 0.5 * 1024.0;
    let by_memory = if frame_footprint_mb > 0.0 {
        (usable_mb / frame_footprint_mb).floor() as usize
    } else {
        cores
    };

    let workers = cores.min(by_memory).max(1);
    log::info!(
        "Worker pool: {} threads ({} cores, {:.2} GB available, ~{:.1} MB per frame)",
        workers,
        cores,
        available_gb,
        frame_footprint_mb
    );
    workers
}
