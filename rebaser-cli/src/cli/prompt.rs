use std::io::{self, BufRead, Write};

use rebaser_core::agent::{Operator, OperatorInput};
use rebaser_core::display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperatorChoice {
    Continue,
    Stop,
    Feedback,
}

fn parse_operator_choice(answer: &str) -> Option<OperatorChoice> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" => Some(OperatorChoice::Continue),
        "n" => Some(OperatorChoice::Stop),
        "f" => Some(OperatorChoice::Feedback),
        _ => None,
    }
}

/// Asks on stderr and reads answers from `input`. End of input stops the loop.
pub(crate) fn ask_operator<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> io::Result<OperatorInput> {
    write!(
        output,
        "{}",
        display::operator_prompt("Continue? (y/n) or offer feedback (f): ")
    )?;
    output.flush()?;

    let choice = loop {
        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(OperatorInput::Stop);
        }
        match parse_operator_choice(&answer) {
            Some(choice) => break choice,
            None => {
                writeln!(
                    output,
                    "Invalid input {}. Please enter 'y', 'n', or 'f'.",
                    answer.trim()
                )?;
                write!(output, "> ")?;
                output.flush()?;
            }
        }
    };

    match choice {
        OperatorChoice::Continue => Ok(OperatorInput::Continue),
        OperatorChoice::Stop => Ok(OperatorInput::Stop),
        OperatorChoice::Feedback => {
            write!(output, "{}", display::operator_prompt("Please provide feedback: "))?;
            output.flush()?;
            let mut feedback = String::new();
            if input.read_line(&mut feedback)? == 0 {
                return Ok(OperatorInput::Stop);
            }
            Ok(OperatorInput::Feedback(feedback.trim().to_string()))
        }
    }
}

/// The person at the terminal.
pub(crate) struct ConsoleOperator;

impl Operator for ConsoleOperator {
    fn review(&mut self, response: &str) -> io::Result<OperatorInput> {
        display::print_response(response);
        let stdin = io::stdin();
        ask_operator(&mut stdin.lock(), &mut io::stderr())
    }
}
