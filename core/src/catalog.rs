//! Theatre domain records.
//!
//! Each record pairs a typed struct (what a screen consumes) with the
//! [`Schema`] its raw payload must satisfy. Field names on the wire are
//! camelCase.

use crate::schema::Schema;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[allow(clippy::expect_used)] // Literal pattern, checked by tests
static SEAT_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{1,2}$").expect("seat row pattern should always compile"));

/// A record with a wire schema.
pub trait CatalogRecord {
    /// Schema the raw payload of one record must satisfy.
    fn schema() -> Schema;
}

fn id() -> Schema {
    Schema::integer().positive().into()
}

fn name(max: usize) -> Schema {
    Schema::string().min_len(1).max_len(max).into()
}

/// A movie genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genre {
    /// Identifier
    pub id: u64,
    /// Display name
    pub name: String,
}

impl CatalogRecord for Genre {
    fn schema() -> Schema {
        Schema::object().field("id", id()).field("name", name(50)).into()
    }
}

/// Anyone credited on a movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// Identifier
    pub id: u64,
    /// Full name
    pub name: String,
    /// Date of birth, when known
    pub date_of_birth: Option<NaiveDate>,
    /// Short biography
    pub biography: Option<String>,
}

impl CatalogRecord for Person {
    fn schema() -> Schema {
        Schema::object()
            .field("id", id())
            .field("name", name(100))
            .optional("dateOfBirth", Schema::date())
            .optional("biography", Schema::string().max_len(2000))
            .into()
    }
}

/// Whether a role is in front of or behind the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleCategory {
    /// On screen
    Cast,
    /// Off screen
    Crew,
}

/// A named role such as "Director" or "Lead".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleType {
    /// Identifier
    pub id: u64,
    /// Display name
    pub role_name: String,
    /// Cast or crew
    pub category: RoleCategory,
}

impl CatalogRecord for RoleType {
    fn schema() -> Schema {
        Schema::object()
            .field("id", id())
            .field("roleName", name(50))
            .field("category", Schema::enumeration(["CAST", "CREW"]))
            .into()
    }
}

/// A cinema building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theatre {
    /// Identifier
    pub id: u64,
    /// Display name
    pub name: String,
    /// Street address
    pub address: String,
    /// City
    pub city: String,
}

impl CatalogRecord for Theatre {
    fn schema() -> Schema {
        Schema::object()
            .field("id", id())
            .field("name", name(100))
            .field("address", Schema::string().min_len(1))
            .field("city", Schema::string().min_len(1))
            .into()
    }
}

/// An auditorium inside a theatre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screen {
    /// Identifier
    pub id: u64,
    /// Owning theatre
    pub theatre_id: u64,
    /// Display name
    pub name: String,
    /// Number of seats
    pub capacity: u32,
}

impl CatalogRecord for Screen {
    fn schema() -> Schema {
        Schema::object()
            .field("id", id())
            .field("theatreId", id())
            .field("name", name(50))
            .field("capacity", Schema::integer().positive())
            .into()
    }
}

/// A movie in the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    /// Identifier
    pub id: u64,
    /// Title
    pub title: String,
    /// Runtime in minutes
    pub runtime: u32,
    /// Release date, when scheduled
    pub release_date: Option<NaiveDate>,
    /// Plot summary
    pub synopsis: Option<String>,
    /// Poster image; the API sends `null` when there is none
    pub poster_url: Option<String>,
    /// Genres
    pub genres: Vec<Genre>,
}

impl CatalogRecord for Movie {
    fn schema() -> Schema {
        Schema::object()
            .field("id", id())
            .field("title", name(200))
            .field("runtime", Schema::integer().positive())
            .optional("releaseDate", Schema::date())
            .optional("synopsis", Schema::string())
            .field("posterUrl", Schema::nullable(Schema::string().min_len(1)))
            .field("genres", Schema::array(Genre::schema()))
            .into()
    }
}

/// Credit of a person on a movie, tagged by `roleType`.
///
/// Only the fields of the selected variant are validated and kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "roleType")]
pub enum MovieCredit {
    /// On-screen credit
    #[serde(rename = "CAST")]
    Cast(CastCredit),
    /// Off-screen credit
    #[serde(rename = "CREW")]
    Crew(CrewCredit),
}

/// Fields of a `CAST` credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastCredit {
    /// Credited person
    pub person_id: u64,
    /// Character played
    pub character_name: String,
    /// Position in the billing, starting at 1
    pub billing_order: u32,
}

/// Fields of a `CREW` credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewCredit {
    /// Credited person
    pub person_id: u64,
    /// Job title
    pub job: String,
}

impl MovieCredit {
    /// The credited person.
    #[must_use]
    pub const fn person_id(&self) -> u64 {
        match self {
            Self::Cast(credit) => credit.person_id,
            Self::Crew(credit) => credit.person_id,
        }
    }
}

impl CatalogRecord for MovieCredit {
    fn schema() -> Schema {
        Schema::tagged_union("roleType")
            .variant(
                "CAST",
                Schema::object()
                    .field("personId", id())
                    .field("characterName", name(100))
                    .field("billingOrder", Schema::integer().positive()),
            )
            .variant(
                "CREW",
                Schema::object().field("personId", id()).field("job", name(100)),
            )
            .into()
    }
}

/// A scheduled screening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Showing {
    /// Identifier
    pub id: u64,
    /// Movie shown
    pub movie_id: u64,
    /// Screen used
    pub screen_id: u64,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// Ticket price
    pub ticket_price: f64,
}

impl CatalogRecord for Showing {
    fn schema() -> Schema {
        Schema::object()
            .field("id", id())
            .field("movieId", id())
            .field("screenId", id())
            .field("startTime", Schema::datetime())
            .field("ticketPrice", Schema::number().min(0.0))
            .into()
    }
}

/// Seat layout of a screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatMap {
    /// Screen described
    pub screen_id: u64,
    /// Rows, front to back
    pub rows: Vec<SeatRow>,
}

/// One row of seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatRow {
    /// Row label, one or two capital letters
    pub row: String,
    /// Seats in the row
    pub seats: Vec<Seat>,
}

/// A single seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    /// Seat number within the row
    pub number: u32,
    /// Whether the seat can be booked
    pub available: bool,
}

impl SeatMap {
    /// Number of bookable seats.
    #[must_use]
    pub fn available_seats(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| &row.seats)
            .filter(|seat| seat.available)
            .count()
    }
}

impl CatalogRecord for SeatMap {
    fn schema() -> Schema {
        let seat = Schema::object()
            .field("number", Schema::integer().positive())
            .field("available", Schema::boolean());
        let row = Schema::object()
            .field(
                "row",
                Schema::string().matches(SEAT_ROW.clone(), "Row must be one or two capital letters"),
            )
            .field("seats", Schema::array(seat).min_items(1));

        Schema::object()
            .field("screenId", id())
            .field("rows", Schema::array(row))
            .into()
    }
}

/// Sign-up form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistration {
    /// Login e-mail
    pub email: String,
    /// Public handle
    pub username: String,
    /// Password
    pub password: String,
    /// Repeated password
    pub confirm_password: String,
}

impl CatalogRecord for UserRegistration {
    fn schema() -> Schema {
        Schema::object()
            .field("email", Schema::string().email())
            .field("username", Schema::string().min_len(3).max_len(30))
            .field("password", Schema::string().min_len(8))
            .field("confirmPassword", Schema::string())
            .refine("confirmPassword", "Passwords don't match", |form| {
                form.get("password") == form.get("confirmPassword")
            })
            .into()
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    /// Records on this page
    pub items: Vec<T>,
    /// Page number, starting at 1
    pub page: u32,
    /// Page size
    pub per_page: u32,
    /// Records across all pages
    pub total: u64,
}

impl<T> Paginated<T> {
    /// Number of pages needed for `total` records.
    #[must_use]
    pub fn page_count(&self) -> u64 {
        if self.per_page == 0 {
            0
        } else {
            self.total.div_ceil(u64::from(self.per_page))
        }
    }

    /// Whether another page follows this one.
    #[must_use]
    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.page_count()
    }
}

impl<T: CatalogRecord> CatalogRecord for Paginated<T> {
    fn schema() -> Schema {
        Schema::object()
            .field("items", Schema::array(T::schema()))
            .field("page", Schema::integer().positive())
            .field("perPage", Schema::integer().positive())
            .field("total", Schema::integer().min(0.0))
            .into()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::{SchemaValidator, ViolationKind};
    use serde_json::json;

    #[test]
    fn test_cast_credit_keeps_only_cast_fields() {
        let raw = json!({
            "roleType": "CAST",
            "personId": 4,
            "characterName": "Ripley",
            "billingOrder": 1,
            "job": "Director"
        });

        let credit: MovieCredit = SchemaValidator::validate(&MovieCredit::schema(), &raw).expect("valid cast credit");
        assert_eq!(
            credit,
            MovieCredit::Cast(CastCredit {
                person_id: 4,
                character_name: "Ripley".into(),
                billing_order: 1,
            })
        );
    }

    #[test]
    fn test_crew_credit_requires_job() {
        let raw = json!({ "roleType": "CREW", "personId": 4, "characterName": "Ripley" });

        let err = SchemaValidator::validate::<MovieCredit>(&MovieCredit::schema(), &raw).expect_err("job is missing");
        assert_eq!(err.paths(), vec!["job"]);
        assert_eq!(err.violations[0].kind, ViolationKind::Missing);
    }

    #[test]
    fn test_registration_reports_mismatch_on_confirmation() {
        let raw = json!({
            "email": "ada@example.com",
            "username": "ada",
            "password": "correct horse",
            "confirmPassword": "battery staple"
        });

        let err = SchemaValidator::validate::<UserRegistration>(&UserRegistration::schema(), &raw)
            .expect_err("passwords differ");
        assert_eq!(err.paths(), vec!["confirmPassword"]);
        assert_eq!(err.violations[0].kind, ViolationKind::Refinement);
    }

    #[test]
    fn test_registration_field_errors_skip_refinement() {
        let raw = json!({
            "email": "not-an-email",
            "username": "ada",
            "password": "short",
            "confirmPassword": "other"
        });

        let err = SchemaValidator::validate::<UserRegistration>(&UserRegistration::schema(), &raw)
            .expect_err("invalid fields");
        assert_eq!(err.paths(), vec!["email", "password"]);
    }

    #[test]
    fn test_seat_row_label_pattern() {
        let raw = json!({
            "screenId": 1,
            "rows": [
                { "row": "A", "seats": [{ "number": 1, "available": true }] },
                { "row": "a1", "seats": [{ "number": 1, "available": false }] }
            ]
        });

        let err = SchemaValidator::validate::<SeatMap>(&SeatMap::schema(), &raw).expect_err("bad row label");
        assert_eq!(err.paths(), vec!["rows[1].row"]);
        assert_eq!(err.violations[0].kind, ViolationKind::InvalidFormat);
    }

    #[test]
    fn test_movie_with_null_poster_and_no_release_date() {
        let raw = json!({
            "id": 7,
            "title": "Alien",
            "runtime": 117,
            "posterUrl": null,
            "genres": [{ "id": 1, "name": "Horror" }]
        });

        let movie: Movie = SchemaValidator::validate(&Movie::schema(), &raw).expect("valid movie");
        assert_eq!(movie.poster_url, None);
        assert_eq!(movie.release_date, None);
        assert_eq!(movie.genres[0].name, "Horror");
    }

    #[test]
    fn test_paginated_genres() {
        let raw = json!({
            "items": [{ "id": 1, "name": "Rock" }, { "id": 2, "name": "" }],
            "page": 1,
            "perPage": 2,
            "total": 5
        });

        let err = SchemaValidator::validate::<Paginated<Genre>>(&Paginated::<Genre>::schema(), &raw)
            .expect_err("empty genre name");
        assert_eq!(err.paths(), vec!["items[1].name"]);

        let page = Paginated::<Genre> {
            items: Vec::new(),
            page: 2,
            per_page: 2,
            total: 5,
        };
        assert_eq!(page.page_count(), 3);
        assert!(page.has_next());
    }

    #[test]
    fn test_available_seats_counts_bookable_only() {
        let map = SeatMap {
            screen_id: 1,
            rows: vec![SeatRow {
                row: "A".into(),
                seats: vec![
                    Seat { number: 1, available: true },
                    Seat { number: 2, available: false },
                    Seat { number: 3, available: true },
                ],
            }],
        };

        assert_eq!(map.available_seats(), 2);
    }
}
