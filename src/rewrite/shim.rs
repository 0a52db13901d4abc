//! In-page interception shim.
//!
//! Scripts are passed through unmodified; every dynamically constructed URL
//! is instead caught at run time by this script, which the HTML rewriter
//! injects at the front of `<head>`. Its rewriting rules mirror the codec:
//! same short-circuit schemes, same path-form encoding.

use url::Url;

use crate::codec::urls::{self, ProxyBase};

/// Attribute marking the injected script; its presence makes re-rewriting a
/// no-op.
pub const MARKER_ATTR: &str = "data-proxy-shim";

const SHIM_TEMPLATE: &str = r##"<script data-proxy-shim>
(function () {
  var P = "__PROXY_ROOT__";
  var S = "__UPSTREAM_SCHEME__";
  var A = "__UPSTREAM_AUTHORITY__";
  var SKIP = ["data:", "javascript:", "mailto:", "tel:", "blob:", "about:"];

  function px(u) {
    if (typeof u !== "string" || u === "" || u === "#") return u;
    for (var i = 0; i < SKIP.length; i++) {
      if (u.indexOf(SKIP[i]) === 0) return u;
    }
    if (u.indexOf(P + "/proxy/") === 0 || u.indexOf("/proxy/") === 0) return u;
    try {
      var abs = u.indexOf("//") === 0 ? "https:" + u : u;
      var r = new URL(abs, S + "://" + A + "/");
      if (r.protocol !== "http:" && r.protocol !== "https:") return u;
      return P + "/proxy/" + r.protocol.replace(":", "") + "/" + r.host + r.pathname + r.search + r.hash;
    } catch (e) {
      return u;
    }
  }

  if (window.fetch) {
    var nativeFetch = window.fetch;
    window.fetch = function (input, init) {
      var opts = init || {};
      if (!opts.credentials) opts.credentials = "include";
      if (typeof input === "string") return nativeFetch(px(input), opts);
      if (input && input.url) return nativeFetch(new Request(px(input.url), input), opts);
      return nativeFetch(input, opts);
    };
  }

  var nativeOpen = XMLHttpRequest.prototype.open;
  XMLHttpRequest.prototype.open = function (method, u, isAsync, user, pass) {
    return nativeOpen.call(this, method, px(u), isAsync !== false, user, pass);
  };
  var nativeSend = XMLHttpRequest.prototype.send;
  XMLHttpRequest.prototype.send = function (body) {
    this.withCredentials = true;
    return nativeSend.call(this, body);
  };

  document.addEventListener("submit", function (event) {
    var form = event.target;
    if (!form || form.tagName !== "FORM") return;
    var act = form.getAttribute("action");
    if (!act) act = location.href;
    form.setAttribute("action", px(act));
  }, true);

  var observer = new MutationObserver(function (mutations) {
    mutations.forEach(function (mutation) {
      mutation.addedNodes.forEach(function (node) {
        if (!node.tagName || !node.getAttribute) return;
        var tag = node.tagName;
        if (tag === "SCRIPT" || tag === "IMG") {
          var current = node.getAttribute("src");
          if (current && px(current) !== current) node.setAttribute("src", px(current));
        } else if (tag === "LINK") {
          var current = node.getAttribute("href");
          if (current && px(current) !== current) node.setAttribute("href", px(current));
        }
      });
    });
  });
  observer.observe(document.documentElement, { childList: true, subtree: true });
})();
</script>"##;

/// Instantiate the shim for the page being rewritten.
pub fn render(proxy: &ProxyBase, upstream: &Url) -> String {
    SHIM_TEMPLATE
        .replace("__PROXY_ROOT__", &proxy.root())
        .replace("__UPSTREAM_SCHEME__", upstream.scheme())
        .replace("__UPSTREAM_AUTHORITY__", &urls::authority_of(upstream))
}
