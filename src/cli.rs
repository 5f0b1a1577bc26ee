use crate::error::UsageError;
use std::env;
use std::process;

/// Prints usage instructions for the program to stderr.
pub fn print_usage() {
    eprintln!("Usage: {} <N>", crate::PROGRAM_NAME);
    eprintln!("  N  number of worker processes (positive integer)");
}

/// Parses the worker count from the arguments after the program name
///
/// # Errors
/// - No argument, or more than one
/// - The argument is not a positive integer
pub fn parse_worker_count<I>(args: I) -> Result<usize, UsageError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let arg = args.next().ok_or(UsageError::Missing)?;
    if let Some(extra) = args.next() {
        return Err(UsageError::Unexpected(extra));
    }
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(UsageError::InvalidCount(arg)),
    }
}

/// Parses command line arguments and returns the worker count
///
/// Exits with status 1 and the usage line on stderr when the arguments
/// are missing or invalid.
pub fn parse_args() -> usize {
    match parse_worker_count(env::args().skip(1)) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            process::exit(1);
        }
    }
}
