//! Local answers used when a module cannot answer.
//!
//! The texts match the demo modules' own output so a degraded page
//! looks the same to the user.

/// Name greeting.
pub fn greet(name: &str) -> String {
    format!("你好, {}! 欢迎使用 Rust WebAssembly!", name)
}

/// Age-bracket greeting. Brackets change at 18, 30 and 60.
pub fn greet_age(age: u32) -> &'static str {
    match age {
        0..=17 => "你好，年轻人！未来属于你们！",
        18..=29 => "你好，青年朋友！正是拼搏的好时光！",
        30..=59 => "你好！事业有成，家庭幸福！",
        _ => "您好！祝您身体健康，万事如意！",
    }
}

/// Greeting shown when the age contract is present but the call failed.
pub const GREET_AGE_ON_ERROR: &str = "你好！欢迎使用Zig WebAssembly！";

/// Reverse by Unicode scalar value.
pub fn reverse(input: &str) -> String {
    input.chars().rev().collect()
}

/// Iterative Fibonacci with `fib(0) = 0`, `fib(1) = 1`.
pub fn fibonacci(n: u32) -> i64 {
    let (mut a, mut b) = (0i64, 1i64);
    for _ in 0..n {
        let next = a.wrapping_add(b);
        a = b;
        b = next;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greet_contains_name() {
        assert!(greet("测试").contains("测试"));
    }

    #[test]
    fn age_brackets() {
        assert_eq!(greet_age(17), "你好，年轻人！未来属于你们！");
        assert_eq!(greet_age(18), "你好，青年朋友！正是拼搏的好时光！");
        assert_eq!(greet_age(29), "你好，青年朋友！正是拼搏的好时光！");
        assert_eq!(greet_age(30), "你好！事业有成，家庭幸福！");
        assert_eq!(greet_age(59), "你好！事业有成，家庭幸福！");
        assert_eq!(greet_age(60), "您好！祝您身体健康，万事如意！");
    }

    #[test]
    fn reverse_is_an_involution() {
        for s in ["", "a", "hello", "测试字符串", "mixed 混合 text"] {
            assert_eq!(reverse(&reverse(s)), s);
        }
        assert_eq!(reverse("测试"), "试测");
    }

    #[test]
    fn fibonacci_values() {
        let expected = [0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55];
        for (n, want) in expected.iter().enumerate() {
            assert_eq!(fibonacci(n as u32), *want);
        }
        assert_eq!(fibonacci(40), 102_334_155);
    }
}
