//! Reading draw, queue and booking status out of visible page text.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use teeclaim_core::QueueStatus;

static OPENS_IN_HMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Opens\s+in\s+(\d{1,2}):(\d{2}):(\d{2})").expect("opens-in H:MM:SS regex is valid")
});

static OPENS_IN_MS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Opens\s+in\s+(\d{1,2}):(\d{2})").expect("opens-in M:SS regex is valid")
});

static QUEUE_POSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Current\s+Position\s*:\s*(\d+)").expect("queue position regex is valid")
});

static BOOKINGS_AVAILABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Approximate\s+Bookings\s+Available\s*:\s*~?(\d+)")
        .expect("bookings available regex is valid")
});

static SECONDS_REMAINING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Seconds remaining.*?(\d+)").expect("seconds remaining regex is valid")
});

const SUCCESS_PHRASES: &[&str] = &[
    "booking has been made",
    "successfully booked",
    "booking successful",
    "booking confirmed",
];

const ALREADY_BOOKED_PHRASES: &[&str] = &[
    "already booked",
    "already has a booking",
    "existing booking",
    "already registered",
];

/// The page is the draw's waiting room.
pub fn in_draw(body: &str) -> bool {
    body.contains("You are in the draw") || body.contains("in the draw to access")
}

/// Countdown shown in the draw's waiting room, `H:MM:SS` or `M:SS`.
pub fn opens_in(body: &str) -> Option<Duration> {
    if let Some(c) = OPENS_IN_HMS.captures(body) {
        let h: u64 = c[1].parse().ok()?;
        let m: u64 = c[2].parse().ok()?;
        let s: u64 = c[3].parse().ok()?;
        return Some(Duration::from_secs(h * 3600 + m * 60 + s));
    }
    let c = OPENS_IN_MS.captures(body)?;
    let m: u64 = c[1].parse().ok()?;
    let s: u64 = c[2].parse().ok()?;
    Some(Duration::from_secs(m * 60 + s))
}

/// `None` unless the page is the queue. Position and availability are each
/// optional since the portal does not always render both.
pub fn queue_status(body: &str) -> Option<QueueStatus> {
    if !body.contains("Current Position") && !body.contains("placed in a queue") {
        return None;
    }
    let position = QUEUE_POSITION
        .captures(body)
        .and_then(|c| c[1].parse().ok());
    let bookings_available = BOOKINGS_AVAILABLE
        .captures(body)
        .and_then(|c| c[1].parse().ok());
    Some(QueueStatus {
        position,
        bookings_available,
    })
}

/// Reservation hold timer on the booking page.
pub fn seconds_remaining(body: &str) -> Option<u64> {
    SECONDS_REMAINING
        .captures(body)
        .and_then(|c| c[1].parse().ok())
}

pub fn is_success(text: &str) -> bool {
    let lower = text.to_lowercase();
    SUCCESS_PHRASES.iter().any(|p| lower.contains(p))
}

pub fn is_already_booked(text: &str) -> bool {
    let lower = text.to_lowercase();
    ALREADY_BOOKED_PHRASES.iter().any(|p| lower.contains(p))
}
