/// One parsed request line of the wire protocol.
///
/// A request is either the literal hello token, or exactly three
/// comma-separated fields `<id>,<COMMAND>,<number>` (the first field is
/// accepted but ignored). Anything else is `Unrecognized` and routed to
/// diagnostics, never answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Hello,
    NextPrime(u64),
    PrimeFactors(u64),
    Unrecognized(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let fields: Vec<&str> = line.split(',').collect();
        match fields.as_slice() {
            ["HALLO"] => Command::Hello,
            [_, command, number] => {
                let Ok(value) = number.trim().parse::<u64>() else {
                    return Command::Unrecognized(line.to_string());
                };
                match *command {
                    "NEXTPRIME" => Command::NextPrime(value),
                    "PRIMEFACTORS" => Command::PrimeFactors(value),
                    _ => Command::Unrecognized(line.to_string()),
                }
            }
            _ => Command::Unrecognized(line.to_string()),
        }
    }
}
