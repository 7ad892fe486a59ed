use proptest::prelude::*;
use sdk::errors::{DeployError, DeployErrorExt};
use sdk::types::Version;

proptest! {
    #[test]
    fn test_error_user_hint_never_echoes_message(message in "\\PC*") {
        let errs = vec![
            DeployError::Config(message.clone()),
            DeployError::Authentication(message.clone()),
            DeployError::Network(message.clone()),
            DeployError::Build(message.clone()),
            DeployError::ManifestShape(message.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            if message.len() > 12 {
                prop_assert!(!hint.contains(message.as_str()));
            }
        }
    }

    #[test]
    fn test_short_tags_pad_with_zero(a in 0u32..1000, b in 0u32..1000, c in 0u32..1000) {
        let v: Version = format!("v{}.{}.{}", a, b, c).parse().unwrap();
        prop_assert_eq!(v, Version::new(a as u64, b as u64, c as u64, 0));
    }

    #[test]
    fn test_order_follows_components(
        left in proptest::array::uniform4(0u64..50),
        right in proptest::array::uniform4(0u64..50),
    ) {
        let l = Version::new(left[0], left[1], left[2], left[3]);
        let r = Version::new(right[0], right[1], right[2], right[3]);
        prop_assert_eq!(l.cmp(&r), left.cmp(&right));
    }

    #[test]
    fn test_non_numeric_components_rejected(word in "[a-zA-Z]{1,8}") {
        let tag = format!("v1.{}.0", word);
        prop_assert!(tag.parse::<Version>().is_err());
    }
}
