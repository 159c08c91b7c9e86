/// Represents the result of attempting to generate a new ID.
///
/// This type models the outcome of [`IdGenerator::try_poll_id`]:
///
/// - [`IdGenStatus::Ready`] indicates a new ID was successfully generated.
/// - [`IdGenStatus::Pending`] means the generator cannot produce a new ID
///   until its clock advances by `yield_for` time units, either because the
///   sequence for the current unit is exhausted or because the clock is
///   behind the last unit handed out.
///
/// This allows non-blocking generation loops and clean backoff strategies.
///
/// # Example
///
/// ```
/// use concord::{Fixed, IdGenStatus, IdGenerator, InstanceIdentity, SequenceIdGenerator, SequenceLayout, TimeSource};
///
/// struct FixedTime;
/// impl TimeSource<u64> for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1
///     }
/// }
///
/// let identity = InstanceIdentity::new(Fixed(1));
/// let generator = SequenceIdGenerator::new(&identity, SequenceLayout::default(), FixedTime).unwrap();
/// match generator.try_poll_id().unwrap() {
///     IdGenStatus::Ready { id } => println!("ID: {id}"),
///     IdGenStatus::Pending { yield_for } => println!("Back off for {yield_for} units"),
/// }
/// ```
///
/// [`IdGenerator::try_poll_id`]: crate::IdGenerator::try_poll_id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdGenStatus {
    /// A unique ID was generated and is ready to use.
    Ready {
        /// The generated ID.
        id: u64,
    },
    /// No ID could be generated for the current time unit.
    ///
    /// Wait at least `yield_for` units of the generator's
    /// [`IdGenerator::TIME_UNIT`] before trying again.
    ///
    /// [`IdGenerator::TIME_UNIT`]: crate::IdGenerator::TIME_UNIT
    Pending {
        /// Number of time units to wait.
        yield_for: u64,
    },
}
