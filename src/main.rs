use brasslantern::{Platform, ZMachine};
use log::debug;
use std::env;
use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::process::exit;

const BANNER: &str = concat!(
    "Brass Lantern, a Z-machine version 3 interpreter\n",
    "Version ",
    env!("CARGO_PKG_VERSION"),
    "\n",
);

const USAGE: &str = concat!(
    "Usage: brasslantern [<options>] <story-file>\n",
    "Options: -showScoreUpdates | Prints the score whenever it changes.",
);

fn main() {
    env_logger::init();
    println!("{}", BANNER);

    let args: Vec<String> = env::args().skip(1).collect();
    let (show_score_updates, story_filename) = match args.as_slice() {
        [file] => (false, file.clone()),
        [flag, file] if flag == "-showScoreUpdates" => (true, file.clone()),
        _ => {
            // argument mistakes are not failures: explain and leave quietly
            println!("{}", USAGE);
            return;
        }
    };

    if !Path::new(&story_filename).exists() {
        println!("ERROR: Story file \"{}\" not found.", story_filename);
        return;
    }

    let story = match fs::read(&story_filename) {
        Ok(story) => story,
        Err(err) => {
            eprintln!("ERROR: Could not read story file \"{}\": {}", story_filename, err);
            exit(1);
        }
    };

    let mut console = Console::new(show_score_updates);
    let result = match ZMachine::new(&mut console, story) {
        Ok(mut z) => z.run(),
        Err(err) => {
            println!("ERROR: {}", err);
            return;
        }
    };

    if let Err(err) = result {
        console.flush();
        eprintln!("Z-machine halted: {}", err);
        exit(1);
    }
}

/// The teletype host: buffers everything the machine prints, word-wraps it
/// to 80 columns on flush, and watches the score global between the game's
/// output and the next prompt.
struct Console {
    buffer: String,
    show_score_updates: bool,
    old_score: i16,
}

const MAX_LINE_WIDTH: usize = 80;

impl Console {
    fn new(show_score_updates: bool) -> Console {
        Console {
            buffer: String::new(),
            show_score_updates,
            old_score: 0,
        }
    }

    /// Splices a score-change message in front of the trailing prompt. When
    /// the buffered output does not end with a bare `>`, the message has
    /// nowhere to go and is dropped.
    fn check_score(&mut self, score: Option<i16>) {
        if !self.show_score_updates {
            return;
        }
        let new_score = match score {
            Some(score) => score,
            None => return, // a time game
        };

        let delta = new_score - self.old_score;
        self.old_score = new_score;

        let message = if delta > 0 {
            format!(
                "[Your score increased by {} points. Your current score is {} points.]\n\n",
                delta, new_score
            )
        } else if delta < 0 {
            format!(
                "[Your score decreased by {} points. Your current score is {} points.]\n\n",
                -delta, new_score
            )
        } else {
            return;
        };

        if self.buffer.ends_with('>') {
            self.buffer.insert_str(self.buffer.len() - 1, &message);
        } else {
            debug!("score changed by {} with no prompt to report it at", delta);
        }
    }

    /// Renders and empties the buffer: each `\n`-separated segment is
    /// word-wrapped to the line width.
    fn rendered(&mut self) -> String {
        let text = std::mem::take(&mut self.buffer);
        let mut out = String::new();
        let mut pos = 0;
        while pos < text.len() {
            match text[pos..].find('\n') {
                Some(rel) => {
                    wrap(&mut out, &text[pos..pos + rel]);
                    out.push('\n');
                    pos += rel + 1;
                }
                None => {
                    wrap(&mut out, &text[pos..]);
                    pos = text.len();
                }
            }
        }
        out
    }
}

/// Greedy word wrap: keep emitting through the next space while the line
/// still fits; a single word wider than the line is split at exactly the
/// line width.
fn wrap(out: &mut String, line: &str) {
    let bytes = line.as_bytes();
    let end = bytes.len();
    let mut line_start = 0;
    let mut i = 0;
    while i < end {
        let next_word = (i..end).find(|&j| bytes[j] != b' ').unwrap_or(end);
        let next_space = (next_word..end).find(|&j| bytes[j] == b' ').unwrap_or(end);

        if next_space - line_start <= MAX_LINE_WIDTH {
            out.push_str(&line[i..next_space]);
            i = next_space;
        } else if next_word == line_start {
            out.push_str(&line[i..i + MAX_LINE_WIDTH]);
            i += MAX_LINE_WIDTH;
            if i < end {
                out.push('\n');
                line_start = i;
            }
        } else {
            i = next_word;
            line_start = next_word;
            out.push('\n');
        }
    }
}

impl Platform for Console {
    fn print(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    fn read_line(&mut self, score: Option<i16>) -> String {
        self.check_score(score);
        self.flush();
        let mut line = String::new();
        let n = io::stdin()
            .read_line(&mut line)
            .expect("could not read from standard input");
        if n == 0 {
            // end of input: a teletype has nothing left to wait for
            exit(0);
        }
        line.trim_end_matches(|c| c == '\r' || c == '\n').to_string()
    }

    fn flush(&mut self) {
        let text = self.rendered();
        print!("{}", text);
        io::stdout().flush().expect("could not write to standard output");
    }

    fn prime_score(&mut self, score: Option<i16>) {
        if let Some(score) = score {
            self.old_score = score;
        }
    }

    fn read_file(&mut self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(name)
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> io::Result<()> {
        fs::write(name, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapped(line: &str) -> String {
        let mut out = String::new();
        wrap(&mut out, line);
        out
    }

    #[test]
    fn test_wrap_leaves_short_lines_alone() {
        assert_eq!(wrapped("You are standing in an open field."), "You are standing in an open field.");
        assert_eq!(wrapped(""), "");
    }

    #[test]
    fn test_wrap_breaks_between_words() {
        let words = vec!["word"; 30].join(" ");
        for line in wrapped(&words).split('\n') {
            assert!(line.len() <= MAX_LINE_WIDTH, "line too long: {:?}", line);
            assert!(!line.starts_with(' '));
        }
    }

    #[test]
    fn test_wrap_splits_overlong_word_at_width() {
        let long = "x".repeat(200);
        let out = wrapped(&long);
        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines[0].len(), MAX_LINE_WIDTH);
        assert_eq!(lines[1].len(), MAX_LINE_WIDTH);
        assert_eq!(lines[2].len(), 40);
    }

    #[test]
    fn test_score_message_splices_before_prompt() {
        let mut console = Console::new(true);
        console.print("Taken.\n\n>");
        console.check_score(Some(15));
        assert_eq!(
            console.buffer,
            "Taken.\n\n[Your score increased by 15 points. Your current score is 15 points.]\n\n>"
        );
        assert_eq!(console.old_score, 15);
    }

    #[test]
    fn test_score_decrease_message() {
        let mut console = Console::new(true);
        console.old_score = 10;
        console.print(">");
        console.check_score(Some(7));
        assert!(console.buffer.contains("[Your score decreased by 3 points."));
        assert!(console.buffer.contains("current score is 7 points.]"));
    }

    #[test]
    fn test_score_message_dropped_without_prompt() {
        let mut console = Console::new(true);
        console.print("Taken.\n");
        console.check_score(Some(5));
        assert_eq!(console.buffer, "Taken.\n");
        // the new score still becomes the baseline
        assert_eq!(console.old_score, 5);
    }

    #[test]
    fn test_score_watcher_quiet_when_disabled() {
        let mut console = Console::new(false);
        console.print(">");
        console.check_score(Some(5));
        assert_eq!(console.buffer, ">");
        assert_eq!(console.old_score, 0);
    }

    #[test]
    fn test_unchanged_score_is_silent() {
        let mut console = Console::new(true);
        console.old_score = 5;
        console.print(">");
        console.check_score(Some(5));
        assert_eq!(console.buffer, ">");
    }
}
