use rand::Rng;

/// `<hostname>-<pid>`, or `instance-<random>-<pid>` when no hostname is known.
///
/// Used as the scheduler lock owner so a lock can be traced back to the
/// process that holds it.
pub fn instance_id() -> String {
    let pid = std::process::id();
    match hostname() {
        Some(host) => format!("{host}-{pid}"),
        None => format!("instance-{:08x}-{pid}", rand::rng().random::<u32>()),
    }
}

fn hostname() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|raw| raw.trim().to_string())
        })
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ends_with_the_process_id() {
        let id = instance_id();
        assert!(id.ends_with(&format!("-{}", std::process::id())));
    }
}
