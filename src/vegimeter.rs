//! The Vegimeter 2 application: one QuickStart board running the greenhouse
//! engine as a single thread on port 10.

use crate::app::{AppError, Board, Mapping, Port, Thread};
use crate::config::Config;

pub const MAPPING_NAME: &str = "vegimeter2";
pub const ENGINE_THREAD: &str = "ENGINE";
pub const ENGINE_ENTRY_POINT: &str = "engine_runner";
pub const ENGINE_PORT: u32 = 10;

pub fn declare() -> Result<Mapping, AppError> {
    let board = Board::new();
    Mapping::new(
        MAPPING_NAME,
        board.get_processor(),
        vec![Thread::new(ENGINE_THREAD, ENGINE_ENTRY_POINT, Port::new(ENGINE_PORT)?)],
    )
}

/// Same shape as [`declare`], with board, name and threads taken from config.
pub fn declare_from(config: &Config) -> Result<Mapping, AppError> {
    let board = Board::from_model(&config.board.model)?;
    let threads = config
        .mapping
        .threads
        .iter()
        .map(|t| Ok(Thread::new(&t.label, &t.entry_point, Port::new(t.port)?)))
        .collect::<Result<Vec<_>, AppError>>()?;
    let mapping = Mapping::new(&config.mapping.name, board.get_processor(), threads)?;
    Ok(match config.mapping.distributor {
        Some(kind) => mapping.with_distributor(kind),
        None => mapping,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_declares_the_same_mapping() {
        assert_eq!(declare_from(&Config::default()).unwrap(), declare().unwrap());
    }

    #[test]
    fn unknown_board_is_reported() {
        let mut config = Config::default();
        config.board.model = "nope".to_string();
        assert_eq!(
            declare_from(&config),
            Err(AppError::UnknownBoard("nope".to_string()))
        );
    }
}
