use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use pdfchapters_core::Command;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    OpenChapterList,
    CloseOverlay,
    MoveSelection { delta: isize },
    ActivateSelection,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    ChapterList,
}

/// Maps key presses to viewer commands, keeping a vi-style count prefix.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        let Event::Key(key) = event else {
            return UiEvent::None;
        };
        if key.kind == KeyEventKind::Release {
            return UiEvent::None;
        }
        match self.mode {
            InputMode::Normal => self.map_normal(key),
            InputMode::ChapterList => self.map_chapter_list(key),
        }
    }

    fn map_normal(&mut self, key: KeyEvent) -> UiEvent {
        match (key.code, key.modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE)
            | (KeyCode::Down, KeyModifiers::NONE)
            | (KeyCode::Char(' '), KeyModifiers::NONE)
            | (KeyCode::PageDown, _) => {
                let count = self.take_count();
                UiEvent::Command(Command::NextPage { count })
            }
            (KeyCode::Char('k'), KeyModifiers::NONE)
            | (KeyCode::Up, KeyModifiers::NONE)
            | (KeyCode::PageUp, _) => {
                let count = self.take_count();
                UiEvent::Command(Command::PrevPage { count })
            }
            // `g` alone goes to the first page, `12g` to page 12.
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                let page = self.take_count();
                UiEvent::Command(Command::GotoPage { page })
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                self.reset_count();
                UiEvent::Command(Command::GotoPage { page: usize::MAX })
            }
            (KeyCode::Char('+'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomIn)
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomOut)
            }
            (KeyCode::Char('='), _) => {
                self.reset_count();
                UiEvent::Command(Command::ResetZoom)
            }
            (KeyCode::Char('c'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::ClearChapter)
            }
            (KeyCode::Char('t'), _) | (KeyCode::Char('T'), _) => {
                self.reset_count();
                UiEvent::OpenChapterList
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_chapter_list(&mut self, key: KeyEvent) -> UiEvent {
        match (key.code, key.modifiers) {
            (KeyCode::Esc, _) | (KeyCode::Char('t'), _) | (KeyCode::Char('T'), _) => {
                UiEvent::CloseOverlay
            }
            (KeyCode::Enter, _) => UiEvent::ActivateSelection,
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                UiEvent::MoveSelection { delta: 1 }
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                UiEvent::MoveSelection { delta: -1 }
            }
            (KeyCode::PageDown, _) => UiEvent::MoveSelection { delta: 10 },
            (KeyCode::PageUp, _) => UiEvent::MoveSelection { delta: -10 },
            (KeyCode::Char('q'), _) => UiEvent::Quit,
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        self.pending_count = Some(current.saturating_mul(10).saturating_add(digit));
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    /// Digits typed so far, for the status line.
    pub fn pending_input(&self) -> Option<&str> {
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(&self.pending_digits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn numeric_prefix_repeats_next_page() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('1'))), UiEvent::None);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('2'))), UiEvent::None);
        assert_eq!(mapper.pending_input(), Some("12"));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Command(Command::NextPage { count: 12 })
        );
        assert_eq!(mapper.pending_input(), None);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Down)),
            UiEvent::Command(Command::NextPage { count: 1 })
        );
    }

    #[test]
    fn prefix_is_dropped_by_unrelated_keys() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('4')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('+'))),
            UiEvent::Command(Command::ZoomIn)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('k'))),
            UiEvent::Command(Command::PrevPage { count: 1 })
        );
    }

    #[test]
    fn g_uses_prefix_as_page_number() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(Command::GotoPage { page: 1 })
        );
        mapper.map_event(key_event(KeyCode::Char('3')));
        mapper.map_event(key_event(KeyCode::Char('0')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(Command::GotoPage { page: 30 })
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('G'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(Command::GotoPage { page: usize::MAX })
        );
    }

    #[test]
    fn zoom_and_chapter_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('-'))),
            UiEvent::Command(Command::ZoomOut)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('='))),
            UiEvent::Command(Command::ResetZoom)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('c'))),
            UiEvent::Command(Command::ClearChapter)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('t'))),
            UiEvent::OpenChapterList
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('c'),
                KeyModifiers::CONTROL
            )),
            UiEvent::Quit
        );
    }

    #[test]
    fn chapter_list_mode_maps_selection_keys() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::ChapterList);

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::MoveSelection { delta: 1 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Up)),
            UiEvent::MoveSelection { delta: -1 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::ActivateSelection
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::CloseOverlay
        );
        // Digits are not a prefix here.
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('5'))), UiEvent::None);
        assert_eq!(mapper.pending_input(), None);
    }

    #[test]
    fn switching_modes_clears_prefix() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('7')));
        assert_eq!(mapper.pending_input(), Some("7"));
        mapper.set_mode(InputMode::ChapterList);
        assert_eq!(mapper.pending_input(), None);
        mapper.set_mode(InputMode::Normal);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Command(Command::NextPage { count: 1 })
        );
    }

    #[test]
    fn key_release_is_ignored() {
        let mut mapper = EventMapper::new();
        let release = Event::Key(KeyEvent {
            code: KeyCode::Char('j'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        assert_eq!(mapper.map_event(release), UiEvent::None);
    }
}
