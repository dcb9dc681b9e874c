pub(crate) enum ControlMessage {
    Stop,
    /// The speed atomic changed; re-anchor the step deadline to now.
    SpeedChanged,
}
