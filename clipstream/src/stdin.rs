//! Line-by-line input for prompts.
//!
//! Everything that asks the operator something reads through [`SharedStdin`], so there is only
//! ever one buffer on top of the process's standard input.

use std::future::Future;
use std::io;
use std::sync::OnceLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// A source of answer lines, without their line terminators.
pub trait LineSource {
    /// `Ok(None)` once the input is exhausted.
    fn next_line(&mut self) -> impl Future<Output = io::Result<Option<String>>>;
}

impl<R> LineSource for Lines<R>
where
    R: AsyncBufRead + Unpin,
{
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        Lines::next_line(self).await
    }
}

/// Handle to the process-wide standard input reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedStdin;

fn shared() -> &'static Mutex<Lines<BufReader<Stdin>>> {
    static STDIN: OnceLock<Mutex<Lines<BufReader<Stdin>>>> = OnceLock::new();
    STDIN.get_or_init(|| Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}

impl LineSource for SharedStdin {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        shared().lock().await.next_line().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_are_handed_out_in_order() {
        let mut lines = "first\r\nsecond\n".as_bytes().lines();
        assert_eq!(
            LineSource::next_line(&mut lines).await.unwrap().as_deref(),
            Some("first")
        );
        assert_eq!(
            LineSource::next_line(&mut lines).await.unwrap().as_deref(),
            Some("second")
        );
        assert_eq!(LineSource::next_line(&mut lines).await.unwrap(), None);
    }
}
