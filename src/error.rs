use std::fmt::Display;

#[derive(Debug)]
pub enum RelaxError {
    Input(String),
    Network(String),
    Solver(String),
    PostProcessor(String),
}

impl Display for RelaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (err_name, value) = match self {
            RelaxError::Input(v) => ("Input", v),
            RelaxError::Network(v) => ("Network", v),
            RelaxError::Solver(v) => ("Solver", v),
            RelaxError::PostProcessor(v) => ("Post Processor", v),
        };

        write!(f, "{} error: {}", err_name, value)
    }
}

impl std::error::Error for RelaxError {}

impl From<argmin::core::Error> for RelaxError {
    fn from(err: argmin::core::Error) -> Self {
        RelaxError::Solver(format!("{err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_stage() {
        let err = RelaxError::PostProcessor("disk full".to_owned());
        assert_eq!(err.to_string(), "Post Processor error: disk full");

        let err = RelaxError::Network("edge 3 is a loop".to_owned());
        assert_eq!(err.to_string(), "Network error: edge 3 is a loop");
    }
}
