use parking_lot::Mutex;

/// Everything shown in the chat, in the order it happened. Lives as long as the process and
/// is only ever appended to.
#[derive(Debug, Default)]
pub struct HistoryLog {
    entries: Mutex<Vec<String>>,
}

impl HistoryLog {
    pub fn new() -> HistoryLog {
        HistoryLog::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Copy of the log as it stands now.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn keeps_append_order() {
        let log = HistoryLog::new();
        assert!(log.is_empty());
        log.push("[alice@me] hi");
        log.push(String::from("[peer#1@127.0.0.1:4000] bob: hey"));
        assert_eq!(
            log.snapshot(),
            vec!["[alice@me] hi", "[peer#1@127.0.0.1:4000] bob: hey"]
        );
    }

    #[test]
    fn concurrent_appends_are_all_kept() {
        let log = Arc::new(HistoryLog::new());
        let writers: Vec<_> = (0..8)
            .map(|w| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        log.push(format!("{}-{}", w, i));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(log.len(), 800);

        // Each writer's own entries stay in the order it wrote them.
        let entries = log.snapshot();
        for w in 0..8 {
            let prefix = format!("{}-", w);
            let seq: Vec<u32> = entries
                .iter()
                .filter_map(|e| e.strip_prefix(&prefix))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..100).collect::<Vec<_>>());
        }
    }
}
