use chrono::{
  DateTime,
  NaiveDate,
  NaiveDateTime,
  SecondsFormat,
  TimeZone,
  Timelike,
  Utc
};

/// Current time truncated to whole milliseconds, the precision the
/// persisted ISO-8601 form carries.
pub fn now_millis() -> DateTime<Utc> {
  truncate_millis(Utc::now())
}

pub fn truncate_millis(
  dt: DateTime<Utc>
) -> DateTime<Utc> {
  let nanos = dt.nanosecond();
  let millis_only =
    (nanos / 1_000_000) * 1_000_000;
  dt.with_nanosecond(millis_only)
    .unwrap_or(dt)
}

pub fn format_iso(
  dt: &DateTime<Utc>
) -> String {
  dt.to_rfc3339_opts(
    SecondsFormat::Millis,
    true
  )
}

/// Parses the date shapes found in stored and exported documents.
pub fn parse_iso_lenient(
  raw: &str
) -> Option<DateTime<Utc>> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(
      trimmed
    )
  {
    return Some(dt.with_timezone(&Utc));
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        trimmed, fmt
      )
    {
      return Some(
        Utc.from_utc_datetime(&ndt)
      );
    }
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      trimmed, "%Y-%m-%d"
    )
  {
    return date
      .and_hms_opt(0, 0, 0)
      .map(|ndt| {
        Utc.from_utc_datetime(&ndt)
      });
  }

  None
}

pub fn from_epoch_millis(
  millis: i64
) -> Option<DateTime<Utc>> {
  Utc.timestamp_millis_opt(millis)
    .single()
}

pub mod iso_date_serde {
  use chrono::{
    DateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };
  use serde_json::Value;

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_iso(dt)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      Value::deserialize(deserializer)?;
    from_value(&raw).ok_or_else(|| {
      serde::de::Error::custom(
        format!(
          "invalid timestamp: {raw}"
        )
      )
    })
  }

  pub(crate) fn from_value(
    raw: &Value
  ) -> Option<DateTime<Utc>> {
    match raw {
      | Value::String(text) => {
        super::parse_iso_lenient(text)
      }
      | Value::Number(num) => {
        num.as_i64().and_then(
          super::from_epoch_millis
        )
      }
      | _ => None
    }
  }

  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };
    use serde_json::Value;

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let raw = Option::<Value>::deserialize(
        deserializer
      )?;
      match raw {
        | None | Some(Value::Null) => {
          Ok(None)
        }
        | Some(Value::String(text))
          if text.trim().is_empty() =>
        {
          Ok(None)
        }
        | Some(value) => {
          super::from_value(&value)
            .map(Some)
            .ok_or_else(|| {
              serde::de::Error::custom(
                format!(
                  "invalid timestamp: \
                   {value}"
                )
              )
            })
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    Datelike,
    TimeZone,
    Timelike,
    Utc
  };

  use super::{
    format_iso,
    parse_iso_lenient,
    truncate_millis
  };

  #[test]
  fn parses_js_iso_strings_and_bare_dates()
  {
    let js = parse_iso_lenient(
      "2026-03-01T10:20:30.456Z"
    )
    .expect("iso string");
    assert_eq!(js.hour(), 10);
    assert_eq!(
      js.nanosecond(),
      456_000_000
    );

    let bare =
      parse_iso_lenient("2026-03-01")
        .expect("bare date");
    assert_eq!(bare.day(), 1);
    assert_eq!(bare.hour(), 0);

    assert!(
      parse_iso_lenient("yesterday")
        .is_none()
    );
  }

  #[test]
  fn formats_with_millisecond_precision()
  {
    let dt = Utc
      .with_ymd_and_hms(
        2026, 1, 2, 3, 4, 5
      )
      .unwrap();
    assert_eq!(
      format_iso(&dt),
      "2026-01-02T03:04:05.000Z"
    );
  }

  #[test]
  fn truncation_drops_sub_millisecond_digits()
  {
    let dt = Utc
      .with_ymd_and_hms(
        2026, 1, 2, 3, 4, 5
      )
      .unwrap()
      .with_nanosecond(123_456_789)
      .unwrap();
    assert_eq!(
      truncate_millis(dt).nanosecond(),
      123_000_000
    );
  }
}
