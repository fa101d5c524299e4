//! The exit-code enumeration: stable codes distinguishing each
//! startup/runtime failure class so operators and process supervisors can
//! branch on them.

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    ConfigError = 1,
    TimeTableNotFound = 2,
    TimeTableUnreadable = 3,
    TimeTableSyntax = 4,
    TimeTableContent = 5,
    HeatingInitError = 6,
    CoolingInitError = 7,
    ThermometerInitError = 8,
    SocketInitError = 9,
    RuntimeError = 10,
    ShutdownError = 11,
    KeyboardInterrupt = 12,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<&crate::timetable::TimeTableError> for ExitCode {
    fn from(e: &crate::timetable::TimeTableError) -> Self {
        use crate::timetable::TimeTableError;
        match e {
            TimeTableError::InvalidSyntax(_) => ExitCode::TimeTableSyntax,
            TimeTableError::InvalidContent(_) => ExitCode::TimeTableContent,
            TimeTableError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ExitCode::TimeTableNotFound
            }
            TimeTableError::Io { .. } => ExitCode::TimeTableUnreadable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(ExitCode::Ok.code(), 0);
        assert_eq!(ExitCode::ConfigError.code(), 1);
        assert_eq!(ExitCode::KeyboardInterrupt.code(), 12);
    }
}
