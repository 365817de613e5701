use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamExit {
    pub code: Option<i32>,
    pub error: Option<String>,
}

impl StreamExit {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            error: None,
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none() && self.code == Some(0)
    }

    pub fn describe(&self) -> String {
        match (&self.error, self.code) {
            (Some(err), _) => err.clone(),
            (None, Some(code)) => format!("exit {code}"),
            (None, None) => "terminated by signal".to_string(),
        }
    }
}

enum StreamItem {
    Line(String),
    Exited(StreamExit),
}

#[derive(Clone)]
pub struct LineSink {
    tx: mpsc::UnboundedSender<StreamItem>,
}

impl LineSink {
    pub fn line(&self, line: impl Into<String>) -> bool {
        self.tx.send(StreamItem::Line(line.into())).is_ok()
    }

    pub fn exit(self, exit: StreamExit) {
        let _ = self.tx.send(StreamItem::Exited(exit));
    }
}

pub struct LineStream {
    rx: mpsc::UnboundedReceiver<StreamItem>,
    exit: Option<StreamExit>,
}

impl LineStream {
    pub fn channel() -> (LineSink, LineStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (LineSink { tx }, LineStream { rx, exit: None })
    }

    pub async fn next_line(&mut self) -> Option<String> {
        if self.exit.is_some() {
            return None;
        }
        match self.rx.recv().await {
            Some(StreamItem::Line(line)) => Some(line),
            Some(StreamItem::Exited(exit)) => {
                self.exit = Some(exit);
                None
            }
            None => {
                self.exit = Some(StreamExit {
                    code: None,
                    error: Some("output stream closed without exit status".into()),
                });
                None
            }
        }
    }

    pub async fn wait(mut self) -> StreamExit {
        while self.next_line().await.is_some() {}
        self.exit.take().unwrap_or(StreamExit {
            code: None,
            error: Some("output stream closed without exit status".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_arrive_in_order_then_exit() {
        let (sink, mut stream) = LineStream::channel();
        sink.line("one");
        sink.line("two");
        sink.exit(StreamExit::code(3));

        assert_eq!(stream.next_line().await.as_deref(), Some("one"));
        assert_eq!(stream.next_line().await.as_deref(), Some("two"));
        assert_eq!(stream.next_line().await, None);
        let exit = stream.wait().await;
        assert_eq!(exit.code, Some(3));
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn dropped_sink_reports_error() {
        let (sink, stream) = LineStream::channel();
        drop(sink);
        let exit = stream.wait().await;
        assert!(exit.error.is_some());
    }
}
