pub mod booking;
pub mod event;
pub mod theater;
pub mod user;

pub use booking::{Booking, NewBooking, TicketLookup};
pub use event::{Event, EventDetails, EventPatch, NewEvent};
pub use theater::{NewTheater, SeatCoord, Theater, TheaterSummary, MAX_ROWS, MAX_SEATS_PER_ROW};
pub use user::{AuthAccount, Role, UnknownRole, UserProfile};
