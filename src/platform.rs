use std::io;

/// Everything the machine needs from the world outside: a teletype and a
/// place to keep save files. The trait is deliberately narrow; the console
/// host behind it owns line buffering, word wrapping and the score watcher.
pub trait Platform {
    /// Appends text to the host's output. Newlines are `\n`; the host
    /// translates to its own line terminator when it actually writes.
    fn print(&mut self, text: &str);

    /// Flushes pending output and reads one line of input, without its
    /// terminator. `score` carries the current value of the score global
    /// for score games (`None` for time games) so the host may report
    /// score changes between the game's output and the prompt.
    fn read_line(&mut self, score: Option<i16>) -> String;

    /// Flushes pending output without reading anything. Called at quit; the
    /// front end calls it once more before reporting a fatal fault.
    fn flush(&mut self) {}

    /// Resets the host's idea of the current score without reporting a
    /// change. Called after restore and restart.
    fn prime_score(&mut self, _score: Option<i16>) {}

    /// Reads a save file whole.
    fn read_file(&mut self, name: &str) -> io::Result<Vec<u8>>;

    /// Writes a save file whole, replacing any previous contents.
    fn write_file(&mut self, name: &str, data: &[u8]) -> io::Result<()>;
}
