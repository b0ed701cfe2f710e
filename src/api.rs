//! Request and response shapes of the health backend.
//!
//! Only the contract lives here; the HTTP transport belongs to the host
//! application.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, RingError},
    types::RingHealthData,
};

/// Uniform envelope around every backend response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded
    pub success: bool,
    /// Payload
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
    /// Error description
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the payload of a successful response
    ///
    /// # Errors
    ///
    /// Returns [`RingError::Api`] with the envelope's `error`, falling back to
    /// its `message`, when the call failed or carried no data.
    pub fn into_result(self) -> Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(RingError::Api(
                self.message
                    .unwrap_or_else(|| "response carried no data".to_string()),
            )),
            (false, _) => Err(RingError::Api(
                self.error
                    .or(self.message)
                    .unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

/// Step count to log for a day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepsLog {
    /// Steps
    pub steps: u32,
    /// Distance in meters
    pub distance_meters: u32,
    /// Day in `YYYY-MM-DD`
    pub date: String,
}

/// Calories to log for a day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaloriesLog {
    /// Calories burned (kcal)
    pub calories: u32,
    /// Day in `YYYY-MM-DD`
    pub date: String,
}

/// A single heart rate sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRateLog {
    /// Beats per minute
    pub bpm: u16,
    /// Measurement time, seconds since the Unix epoch
    pub recorded_at: u64,
}

/// Logs derived from one health snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HealthLogs {
    /// Steps, when any were counted
    pub steps: Option<StepsLog>,
    /// Calories, when any were burned
    pub calories: Option<CaloriesLog>,
    /// Heart rate, when a reading and its time are known
    pub heart_rate: Option<HeartRateLog>,
}

impl HealthLogs {
    /// Build the logs for `date` from a snapshot, skipping zero sentinels
    #[must_use]
    pub fn from_snapshot(snapshot: &RingHealthData, date: &str) -> Self {
        let steps = (snapshot.steps > 0).then(|| StepsLog {
            steps: snapshot.steps,
            distance_meters: snapshot.distance_meters,
            date: date.to_string(),
        });

        let calories = (snapshot.calories > 0).then(|| CaloriesLog {
            calories: snapshot.calories,
            date: date.to_string(),
        });

        let recorded_at = snapshot
            .last_updated
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs());
        let heart_rate = match (snapshot.heart_rate, recorded_at) {
            (bpm, Some(recorded_at)) if bpm > 0 => Some(HeartRateLog { bpm, recorded_at }),
            _ => None,
        };

        Self {
            steps,
            calories,
            heart_rate,
        }
    }

    /// Check if there is nothing to upload
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.steps.is_none() && self.calories.is_none() && self.heart_rate.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_envelope_success() {
        let response: ApiResponse<StepsLog> = serde_json::from_str(
            r#"{"success":true,"data":{"steps":1200,"distanceMeters":900,"date":"2026-10-19"}}"#,
        )
        .unwrap();

        let log = response.into_result().unwrap();
        assert_eq!(log.steps, 1200);
        assert_eq!(log.distance_meters, 900);
    }

    #[test]
    fn test_envelope_failure_prefers_error() {
        let response: ApiResponse<StepsLog> = serde_json::from_str(
            r#"{"success":false,"message":"Request failed","error":"token expired"}"#,
        )
        .unwrap();
        assert_eq!(
            response.into_result().unwrap_err().to_string(),
            "API error: token expired"
        );

        let response: ApiResponse<StepsLog> =
            serde_json::from_str(r#"{"success":false,"message":"Request failed"}"#).unwrap();
        assert_eq!(
            response.into_result().unwrap_err().to_string(),
            "API error: Request failed"
        );

        let response: ApiResponse<StepsLog> = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(matches!(response.into_result(), Err(RingError::Api(_))));
    }

    #[test]
    fn test_logs_skip_sentinels() {
        let snapshot = RingHealthData {
            steps: 5_000,
            distance_meters: 3_600,
            heart_rate: 71,
            ..RingHealthData::default()
        };

        let logs = HealthLogs::from_snapshot(&snapshot, "2026-10-19");
        assert_eq!(logs.steps.as_ref().map(|s| s.steps), Some(5_000));
        assert!(logs.calories.is_none());
        // No timestamp, no heart rate sample
        assert!(logs.heart_rate.is_none());

        let timed = RingHealthData {
            heart_rate: 71,
            last_updated: Some(UNIX_EPOCH + Duration::from_secs(1_760_000_000)),
            ..RingHealthData::default()
        };
        let logs = HealthLogs::from_snapshot(&timed, "2026-10-19");
        assert_eq!(
            logs.heart_rate,
            Some(HeartRateLog {
                bpm: 71,
                recorded_at: 1_760_000_000
            })
        );

        assert!(HealthLogs::from_snapshot(&RingHealthData::default(), "2026-10-19").is_empty());
    }

    #[test]
    fn test_logs_serialize_camel_case() {
        let json = serde_json::to_string(&HeartRateLog {
            bpm: 60,
            recorded_at: 10,
        })
        .unwrap();
        assert_eq!(json, r#"{"bpm":60,"recordedAt":10}"#);
    }
}
