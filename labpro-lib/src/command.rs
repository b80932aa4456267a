use crate::error::LabProError;

/// What shape of payload a command's response carries.
///
/// The logger's firmware fixes this per opcode; nothing about the response
/// bytes themselves says how to read them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// The device may still emit an acknowledgement frame, but it carries no
    /// semantic payload.
    None,
    /// Comma separated floats.
    NumericVector,
    /// Free text, returned unchanged.
    Text,
}

impl ResponseKind {
    /// Classify an opcode.
    pub fn of(opcode: u16) -> Self {
        match opcode {
            7 | 8 | 9 | 10 | 11 | 115 | 201 => ResponseKind::NumericVector,
            105 | 116 | 117 => ResponseKind::Text,
            _ => ResponseKind::None,
        }
    }
}

/// A numeric command plus its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: u16,
    args: Vec<i64>,
}

impl Command {
    pub fn new(opcode: u16, args: &[i64]) -> Self {
        Self {
            opcode,
            args: args.to_vec(),
        }
    }

    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    pub fn kind(&self) -> ResponseKind {
        ResponseKind::of(self.opcode)
    }

    /// Render the command envelope: `s{<opcode>[,<arg>]*}` with a trailing
    /// carriage return and no space after commas.
    ///
    /// The framer appends the frame terminator on top of the envelope's own
    /// CR; the device tolerates the doubled terminator, and it must stay for
    /// wire compatibility.
    pub fn encode(&self) -> String {
        let mut text = format!("s{{{}", self.opcode);
        for arg in &self.args {
            text.push(',');
            text.push_str(&arg.to_string());
        }
        text.push_str("}\r");
        text
    }
}

/// A classified device response, per [`ResponseKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    None,
    Values(Vec<f64>),
    Text(String),
}

impl CommandReply {
    pub fn into_values(self) -> Option<Vec<f64>> {
        match self {
            CommandReply::Values(values) => Some(values),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            CommandReply::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Characters stripped from both ends of every numeric token.
const TOKEN_TRIM: &[char] = &[' ', '{', '}', '\r', '\n'];

/// Parse a raw response body into a vector of floats.
///
/// Tokens are comma separated; each is trimmed of braces, whitespace and line
/// endings, and tokens left empty by the trim are dropped rather than parsed.
pub fn parse_values(raw: &str) -> Result<Vec<f64>, LabProError> {
    raw.split(',')
        .map(|token| token.trim_matches(TOKEN_TRIM))
        .filter(|token| !token.is_empty())
        .map(|token| {
            token.parse::<f64>().map_err(|source| LabProError::Parse {
                token: token.to_string(),
                source,
            })
        })
        .collect()
}
