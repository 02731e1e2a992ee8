// Scooters

pub const SELECT_SCOOTER_BY_ID: &str = r#"
SELECT id, status, current_lat, current_lng, last_seen, created_at, updated_at, deleted_at
FROM scooters WHERE id = $1 AND deleted_at IS NULL;
"#;

pub const SELECT_SCOOTER_BY_ID_FOR_UPDATE: &str = r#"
SELECT id, status, current_lat, current_lng, last_seen, created_at, updated_at, deleted_at
FROM scooters WHERE id = $1 AND deleted_at IS NULL FOR UPDATE;
"#;

pub const INSERT_SCOOTER: &str = r#"
INSERT INTO scooters (id, status, current_lat, current_lng, last_seen, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $5, $5)
RETURNING id, status, current_lat, current_lng, last_seen, created_at, updated_at, deleted_at;
"#;

pub const UPDATE_SCOOTER: &str = r#"
UPDATE scooters
SET status = $2,
    current_lat = $3,
    current_lng = $4,
    last_seen = GREATEST(last_seen, $5),
    updated_at = $6
WHERE id = $1 AND deleted_at IS NULL
RETURNING id, status, current_lat, current_lng, last_seen, created_at, updated_at, deleted_at;
"#;

pub const UPDATE_SCOOTER_STATUS_CHECKED: &str = r#"
UPDATE scooters
SET status = $2,
    updated_at = $4
WHERE id = $1 AND status = $3 AND deleted_at IS NULL;
"#;

pub const UPDATE_SCOOTER_LOCATION: &str = r#"
UPDATE scooters
SET current_lat = $2,
    current_lng = $3,
    last_seen = GREATEST(last_seen, $4),
    updated_at = $5
WHERE id = $1 AND deleted_at IS NULL;
"#;

pub const SOFT_DELETE_SCOOTER: &str = r#"
UPDATE scooters SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL;
"#;

pub const LIST_SCOOTERS: &str = r#"
SELECT id, status, current_lat, current_lng, last_seen, created_at, updated_at, deleted_at
FROM scooters WHERE deleted_at IS NULL
ORDER BY created_at DESC, id
LIMIT $1 OFFSET $2;
"#;

pub const COUNT_SCOOTERS: &str = r#"
SELECT COUNT(*) FROM scooters WHERE deleted_at IS NULL;
"#;

pub const SELECT_SCOOTERS_IN_BOUNDS: &str = r#"
SELECT id, status, current_lat, current_lng, last_seen, created_at, updated_at, deleted_at
FROM scooters
WHERE current_lat BETWEEN $1 AND $2
  AND current_lng BETWEEN $3 AND $4
  AND deleted_at IS NULL
ORDER BY created_at DESC, id;
"#;

pub const SELECT_SCOOTERS_BY_STATUS: &str = r#"
SELECT id, status, current_lat, current_lng, last_seen, created_at, updated_at, deleted_at
FROM scooters WHERE status = $1 AND deleted_at IS NULL
ORDER BY created_at DESC, id;
"#;

pub const SELECT_SCOOTERS_BY_STATUS_IN_BOUNDS: &str = r#"
SELECT id, status, current_lat, current_lng, last_seen, created_at, updated_at, deleted_at
FROM scooters
WHERE status = $1
  AND current_lat BETWEEN $2 AND $3
  AND current_lng BETWEEN $4 AND $5
  AND deleted_at IS NULL
ORDER BY created_at DESC, id;
"#;

// Users

pub const INSERT_USER: &str = r#"
INSERT INTO users (id, created_at, updated_at) VALUES ($1, $2, $2)
RETURNING id, created_at, updated_at, deleted_at;
"#;

pub const SELECT_USER_BY_ID: &str = r#"
SELECT id, created_at, updated_at, deleted_at FROM users WHERE id = $1 AND deleted_at IS NULL;
"#;

pub const SELECT_USER_BY_ID_FOR_UPDATE: &str = r#"
SELECT id, created_at, updated_at, deleted_at FROM users
WHERE id = $1 AND deleted_at IS NULL FOR UPDATE;
"#;

pub const TOUCH_USER: &str = r#"
UPDATE users SET updated_at = $2 WHERE id = $1 AND deleted_at IS NULL
RETURNING id, created_at, updated_at, deleted_at;
"#;

pub const SOFT_DELETE_USER: &str = r#"
UPDATE users SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL;
"#;

pub const LIST_USERS: &str = r#"
SELECT id, created_at, updated_at, deleted_at FROM users WHERE deleted_at IS NULL
ORDER BY created_at DESC, id
LIMIT $1 OFFSET $2;
"#;

pub const COUNT_USERS: &str = r#"
SELECT COUNT(*) FROM users WHERE deleted_at IS NULL;
"#;

// Trips

pub const INSERT_TRIP: &str = r#"
INSERT INTO trips (id, scooter_id, user_id, start_time, start_lat, start_lng, status, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, 'active', $7, $7)
RETURNING id, scooter_id, user_id, start_time, end_time, start_lat, start_lng, end_lat, end_lng,
          status, created_at, updated_at, deleted_at;
"#;

pub const SELECT_TRIP_BY_ID: &str = r#"
SELECT id, scooter_id, user_id, start_time, end_time, start_lat, start_lng, end_lat, end_lng,
       status, created_at, updated_at, deleted_at
FROM trips WHERE id = $1 AND deleted_at IS NULL;
"#;

pub const SELECT_ACTIVE_TRIP_BY_SCOOTER: &str = r#"
SELECT id, scooter_id, user_id, start_time, end_time, start_lat, start_lng, end_lat, end_lng,
       status, created_at, updated_at, deleted_at
FROM trips WHERE scooter_id = $1 AND status = 'active' AND deleted_at IS NULL
ORDER BY created_at DESC, id
LIMIT 1;
"#;

pub const SELECT_ACTIVE_TRIP_BY_USER: &str = r#"
SELECT id, scooter_id, user_id, start_time, end_time, start_lat, start_lng, end_lat, end_lng,
       status, created_at, updated_at, deleted_at
FROM trips WHERE user_id = $1 AND status = 'active' AND deleted_at IS NULL
ORDER BY created_at DESC, id
LIMIT 1;
"#;

pub const UPDATE_TRIP_END: &str = r#"
UPDATE trips
SET end_time = $2,
    end_lat = $3,
    end_lng = $4,
    status = $5,
    updated_at = $6
WHERE id = $1 AND status = 'active' AND deleted_at IS NULL
RETURNING id, scooter_id, user_id, start_time, end_time, start_lat, start_lng, end_lat, end_lng,
          status, created_at, updated_at, deleted_at;
"#;

pub const SOFT_DELETE_TRIP: &str = r#"
UPDATE trips SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL;
"#;

pub const LIST_TRIPS: &str = r#"
SELECT id, scooter_id, user_id, start_time, end_time, start_lat, start_lng, end_lat, end_lng,
       status, created_at, updated_at, deleted_at
FROM trips WHERE deleted_at IS NULL
ORDER BY created_at DESC, id
LIMIT $1 OFFSET $2;
"#;

pub const COUNT_TRIPS: &str = r#"
SELECT COUNT(*) FROM trips WHERE deleted_at IS NULL;
"#;

pub const LIST_TRIPS_BY_SCOOTER: &str = r#"
SELECT id, scooter_id, user_id, start_time, end_time, start_lat, start_lng, end_lat, end_lng,
       status, created_at, updated_at, deleted_at
FROM trips WHERE scooter_id = $1 AND deleted_at IS NULL
ORDER BY created_at DESC, id
LIMIT $2 OFFSET $3;
"#;

pub const LIST_TRIPS_BY_USER: &str = r#"
SELECT id, scooter_id, user_id, start_time, end_time, start_lat, start_lng, end_lat, end_lng,
       status, created_at, updated_at, deleted_at
FROM trips WHERE user_id = $1 AND deleted_at IS NULL
ORDER BY created_at DESC, id
LIMIT $2 OFFSET $3;
"#;

// Location updates

pub const INSERT_LOCATION_UPDATE: &str = r#"
INSERT INTO location_updates (id, scooter_id, lat, lng, timestamp, created_at)
VALUES ($1, $2, $3, $4, $5, $6)
RETURNING id, scooter_id, lat, lng, timestamp, created_at, deleted_at;
"#;

pub const SELECT_LOCATION_UPDATE_BY_ID: &str = r#"
SELECT id, scooter_id, lat, lng, timestamp, created_at, deleted_at
FROM location_updates WHERE id = $1 AND deleted_at IS NULL;
"#;

pub const LIST_LOCATION_UPDATES_BY_SCOOTER: &str = r#"
SELECT id, scooter_id, lat, lng, timestamp, created_at, deleted_at
FROM location_updates WHERE scooter_id = $1 AND deleted_at IS NULL
ORDER BY created_at DESC, id
LIMIT $2 OFFSET $3;
"#;

pub const HEALTH_CHECK: &str = "SELECT 1";
