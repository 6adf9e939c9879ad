use crate::models::{Amenities, Listing, Source};
use crate::store::{ListingStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{named_params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS listings (
        url          TEXT PRIMARY KEY,
        source       TEXT NOT NULL,
        title        TEXT NOT NULL,
        price        INTEGER NOT NULL DEFAULT 0,
        rooms        INTEGER NOT NULL DEFAULT 0,
        city         TEXT NOT NULL,
        area         INTEGER NOT NULL DEFAULT 0,
        furnished    INTEGER NOT NULL DEFAULT 0,
        pets_allowed INTEGER NOT NULL DEFAULT 0,
        balcony      INTEGER NOT NULL DEFAULT 0,
        parking      INTEGER NOT NULL DEFAULT 0,
        kitchen      INTEGER NOT NULL DEFAULT 0,
        garden       INTEGER NOT NULL DEFAULT 0,
        lift         INTEGER NOT NULL DEFAULT 0,
        garage       INTEGER NOT NULL DEFAULT 0,
        keller       INTEGER NOT NULL DEFAULT 0,
        date         TEXT NOT NULL,
        image        TEXT,
        address      TEXT,
        description  TEXT,
        floor        TEXT,
        bedrooms     INTEGER,
        bathrooms    INTEGER,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_listings_city ON listings (city);
";

const UPSERT: &str = "
    INSERT INTO listings (
        url, source, title, price, rooms, city, area,
        furnished, pets_allowed, balcony, parking, kitchen, garden, lift, garage, keller,
        date, image, address, description, floor, bedrooms, bathrooms,
        created_at, updated_at
    ) VALUES (
        :url, :source, :title, :price, :rooms, :city, :area,
        :furnished, :pets_allowed, :balcony, :parking, :kitchen, :garden, :lift, :garage, :keller,
        :date, :image, :address, :description, :floor, :bedrooms, :bathrooms,
        :now, :now
    )
    ON CONFLICT(url) DO UPDATE SET
        source = excluded.source,
        title = excluded.title,
        price = excluded.price,
        rooms = excluded.rooms,
        city = excluded.city,
        area = excluded.area,
        furnished = excluded.furnished,
        pets_allowed = excluded.pets_allowed,
        balcony = excluded.balcony,
        parking = excluded.parking,
        kitchen = excluded.kitchen,
        garden = excluded.garden,
        lift = excluded.lift,
        garage = excluded.garage,
        keller = excluded.keller,
        date = excluded.date,
        image = excluded.image,
        address = excluded.address,
        description = excluded.description,
        floor = excluded.floor,
        bedrooms = excluded.bedrooms,
        bathrooms = excluded.bathrooms,
        updated_at = excluded.updated_at
";

const FIND_BY_CITY: &str = "
    SELECT url, source, title, price, rooms, city, area,
           furnished, pets_allowed, balcony, parking, kitchen, garden, lift, garage, keller,
           date, image, address, description, floor, bedrooms, bathrooms
    FROM listings
    WHERE city LIKE :pattern ESCAPE '\\'
    ORDER BY date DESC
";

/// SQLite-backed listing store. One connection, shared behind a mutex and
/// used from blocking tasks.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!("Opened listing store at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Task("connection mutex poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
    }

    #[cfg(test)]
    async fn record_times(&self, url: &str) -> Result<(chrono::DateTime<Utc>, chrono::DateTime<Utc>), StoreError> {
        let url = url.to_string();
        self.with_conn(move |conn| {
            let times = conn.query_row(
                "SELECT created_at, updated_at FROM listings WHERE url = ?1",
                [&url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(times)
        })
        .await
    }
}

#[async_trait]
impl ListingStore for SqliteStore {
    async fn upsert_many(&self, listings: &[Listing]) -> Result<usize, StoreError> {
        if listings.is_empty() {
            return Ok(0);
        }
        let listings = listings.to_vec();

        let written = self
            .with_conn(move |conn| {
                let now = Utc::now();
                let tx = conn.transaction()?;
                let mut written = 0;
                {
                    let mut stmt = tx.prepare_cached(UPSERT)?;
                    for listing in &listings {
                        let a = &listing.amenities;
                        written += stmt.execute(named_params! {
                            ":url": listing.url,
                            ":source": listing.source.name(),
                            ":title": listing.title,
                            ":price": listing.price,
                            ":rooms": listing.rooms,
                            ":city": listing.city,
                            ":area": listing.area,
                            ":furnished": a.furnished,
                            ":pets_allowed": a.pets_allowed,
                            ":balcony": a.balcony,
                            ":parking": a.parking,
                            ":kitchen": a.kitchen,
                            ":garden": a.garden,
                            ":lift": a.lift,
                            ":garage": a.garage,
                            ":keller": a.keller,
                            ":date": listing.date,
                            ":image": listing.image,
                            ":address": listing.address,
                            ":description": listing.description,
                            ":floor": listing.floor,
                            ":bedrooms": listing.bedrooms,
                            ":bathrooms": listing.bathrooms,
                            ":now": now,
                        })?;
                    }
                }
                tx.commit()?;
                Ok(written)
            })
            .await?;

        debug!("Upserted {} listings", written);
        Ok(written)
    }

    async fn find_by_city_like(&self, city: &str) -> Result<Vec<Listing>, StoreError> {
        let pattern = format!("%{}%", escape_like(city.trim()));

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(FIND_BY_CITY)?;
            let rows = stmt.query_map(named_params! { ":pattern": pattern }, listing_from_row)?;
            let listings = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(listings)
        })
        .await
    }
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<Listing> {
    let source: String = row.get("source")?;
    let source = source
        .parse::<Source>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, err.into()))?;

    Ok(Listing {
        source,
        title: row.get("title")?,
        price: row.get("price")?,
        rooms: row.get("rooms")?,
        city: row.get("city")?,
        area: row.get("area")?,
        amenities: Amenities {
            furnished: row.get("furnished")?,
            pets_allowed: row.get("pets_allowed")?,
            balcony: row.get("balcony")?,
            parking: row.get("parking")?,
            kitchen: row.get("kitchen")?,
            garden: row.get("garden")?,
            lift: row.get("lift")?,
            garage: row.get("garage")?,
            keller: row.get("keller")?,
        },
        url: row.get("url")?,
        date: row.get("date")?,
        image: row.get("image")?,
        address: row.get("address")?,
        description: row.get("description")?,
        floor: row.get("floor")?,
        bedrooms: row.get("bedrooms")?,
        bathrooms: row.get("bathrooms")?,
    })
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn listing(url: &str, city: &str, price: u32) -> Listing {
        let mut listing = Listing::new(Source::Kleinanzeigen, format!("Wohnung {price}"), city, url);
        listing.price = price;
        listing.date = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        listing
    }

    #[tokio::test]
    async fn upsert_then_find_round_trips_fields() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut full = listing("https://www.kleinanzeigen.de/s-anzeige/1", "Berlin", 950);
        full.source = Source::WgGesucht;
        full.amenities.balcony = true;
        full.amenities.keller = true;
        full.image = Some("https://img.example.de/1.jpg".to_string());
        full.floor = Some("EG".to_string());
        full.bathrooms = Some(1);

        assert_eq!(store.upsert_many(&[full.clone()]).await.unwrap(), 1);

        let found = store.find_by_city_like("berlin").await.unwrap();
        assert_eq!(found, vec![full]);
    }

    #[tokio::test]
    async fn upsert_replaces_by_url_and_keeps_created_at() {
        let store = SqliteStore::open_in_memory().unwrap();
        let url = "https://www.immowelt.de/expose/7";

        store.upsert_many(&[listing(url, "Berlin", 800)]).await.unwrap();
        let (created, _) = store.record_times(url).await.unwrap();

        store.upsert_many(&[listing(url, "Berlin", 850)]).await.unwrap();
        let (created_again, updated) = store.record_times(url).await.unwrap();

        assert_eq!(created, created_again);
        assert!(updated >= created);

        let found = store.find_by_city_like("Berlin").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].price, 850);
    }

    #[tokio::test]
    async fn city_lookup_is_a_case_insensitive_substring_match() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_many(&[
                listing("https://a.de/1", "Berlin", 700),
                listing("https://a.de/2", "Berlin-Spandau", 650),
                listing("https://a.de/3", "Hamburg", 900),
            ])
            .await
            .unwrap();

        let urls: Vec<String> = store
            .find_by_city_like("BERLIN")
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.url)
            .collect();
        assert_eq!(urls.len(), 2);
        assert!(urls.contains(&"https://a.de/1".to_string()));
        assert!(urls.contains(&"https://a.de/2".to_string()));
    }

    #[tokio::test]
    async fn like_wildcards_in_input_are_literal() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_many(&[listing("https://a.de/1", "Berlin", 700)]).await.unwrap();

        assert!(store.find_by_city_like("%").await.unwrap().is_empty());
        assert!(store.find_by_city_like("B_rlin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_batch_writes_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.upsert_many(&[]).await.unwrap(), 0);
    }
}
