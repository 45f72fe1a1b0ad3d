use super::record::Record;

/// The collection loaded at process start.
pub fn records() -> Vec<Record> {
    vec![
        Record::new(24186, "6oNoTbgkYpvO1I1lYalx0flJ4mqmo4SlysC1r"),
        Record::new(72818, "VpPqIlnp7B6qRfO0kjUbBJZSttgjdmdRRVY1CzncCV"),
        Record::new(38504, "SlIshncYygFSOFI1kHLv1O"),
        Record::new(62403, "yJ6U9WkivngkcodNoRCQtezQsOB2mr1g5IfHHVUGTr26b6"),
        Record::new(93269, "TH0u1qgbbVxQB7EqEqOVPebt0JtAbdfCZnQvPn6XbMPuOcatk4eaCy"),
        Record::new(35416, "rGg8jMAc4KOLkBzsvxsrAGH0oGlSldUb5xpIL"),
        Record::new(63192, "wYIO9qN0kwQn4OdmQAdZVH6Jw54yflapqa6Kbo3"),
        Record::new(27937, "uij4KLKglIo"),
    ]
}
