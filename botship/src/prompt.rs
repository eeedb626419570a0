//! Interactive confirmation

use std::io::{self, BufRead, Write};

use colored::Colorize;

/// Asks the operator a yes/no question
pub trait Prompt {
    fn confirm(&self, question: &str) -> bool;
}

/// Reads the answer from stdin; anything but `y`/`yes` declines
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn confirm(&self, question: &str) -> bool {
        print!("{} {} ", question.yellow(), "[y/N]:".bold());
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

/// Confirms everything (`--yes`)
pub struct AssumeYes;

impl Prompt for AssumeYes {
    fn confirm(&self, _question: &str) -> bool {
        true
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
