use std::net::TcpListener;

/// Checks whether a host port can currently be bound.
///
/// The probe binds and immediately drops a listener. The answer is only a
/// snapshot; the daemon can still lose the race and report a conflict when the
/// container starts, which surfaces as a port-conflict error from the runtime.
pub fn is_port_free(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_port_reports_busy() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind probe listener");
        let port = listener.local_addr().expect("local addr").port();

        assert!(!is_port_free("127.0.0.1", port));
        drop(listener);
        assert!(is_port_free("127.0.0.1", port));
    }
}
