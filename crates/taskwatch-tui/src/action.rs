/// Actions that the TUI can process, mapped from keyboard input or internal events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    NavigateBack,
    ViewResult,
    Download,
    MoveUp,
    MoveDown,
    PageUp,
    PageDown,
    GoTop,
    GoBottom,
    Refresh,
    Resubmit,
    ToggleHelp,
    Tick,
    Resize(u16, u16),
    None,
}
